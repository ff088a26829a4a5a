use comfy_table::Table;
use common::{Job, Run};

fn time_or_dash(t: Option<chrono::DateTime<chrono::Utc>>) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// One-shot listing used by `lookout list`.
pub fn jobs_table(jobs: &[Job]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Id", "Queue", "Job Set", "Owner", "Submitted", "State", "Runs"]);
    for job in jobs {
        table.add_row(vec![
            job.id.0.clone(),
            job.queue.clone(),
            job.job_set.clone(),
            job.owner.clone(),
            job.submitted.format("%Y-%m-%d %H:%M:%S").to_string(),
            job.state.to_string(),
            job.runs.len().to_string(),
        ]);
    }
    table
}

/// Scheduling history: one row per run, oldest first.
pub fn runs_table(runs: &[Run]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Run", "Cluster", "Node", "Created", "Started", "Finished", "Result"]);
    for run in runs {
        let result = match (run.succeeded, &run.error) {
            (Some(true), _) => "succeeded".to_string(),
            (Some(false), Some(e)) => format!("failed: {}", e),
            (Some(false), None) => "failed".to_string(),
            (None, _) => "-".to_string(),
        };
        table.add_row(vec![
            run.k8s_id.clone(),
            run.cluster.clone(),
            run.node.clone().unwrap_or_else(|| "-".to_string()),
            time_or_dash(run.created),
            time_or_dash(run.started),
            time_or_dash(run.finished),
            result,
        ]);
    }
    table
}

pub fn job_detail(job: &Job) -> String {
    let mut out = String::new();
    out.push_str("Job Details:\n");
    out.push_str(&format!("  ID:        {}\n", job.id));
    out.push_str(&format!("  Queue:     {}\n", job.queue));
    out.push_str(&format!("  Job Set:   {}\n", job.job_set));
    out.push_str(&format!("  Owner:     {}\n", job.owner));
    out.push_str(&format!("  Priority:  {}\n", job.priority));
    out.push_str(&format!("  Submitted: {}\n", time_or_dash(Some(job.submitted))));
    out.push_str(&format!("  Cancelled: {}\n", time_or_dash(job.cancelled)));
    out.push_str(&format!("  State:     {}\n", job.state));
    if job.runs.is_empty() {
        out.push_str("Scheduling history: none\n");
    } else {
        out.push_str("Scheduling history:\n");
        out.push_str(&runs_table(&job.runs).to_string());
        out.push('\n');
    }
    out
}
