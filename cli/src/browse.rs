use anyhow::{anyhow, Result};
use common::{parse_job_states, parse_order, QueryChange};
use std::io::Write;
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::client::RemoteJobs;
use crate::output;
use crate::table::{ColumnId, JobTableView, LoadError, RowSlot};

const HELP: &str = "\
  j/k [n]          scroll down/up (default 1)
  n/p              next/previous page
  g                back to the top
  x <index>        toggle selection of a row
  selected         list selected jobs
  clear            clear the selection
  cancel           cancel the selected jobs
  show <index>     job details and scheduling history
  queue [name]     set or clear the queue filter (exact)
  jobset|id|owner [text]   set or clear a prefix filter
  states [A,B,..]  filter by state (QUEUED, PENDING, RUNNING, SUCCEEDED, FAILED, CANCELLED)
  order newest|oldest
  col <name> on|off
  r                refresh
  q                quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Down(usize),
    Up(usize),
    PageDown,
    PageUp,
    Top,
    Toggle(usize),
    Selected,
    ClearSelection,
    Cancel,
    Show(usize),
    Query(QueryChange),
    Column(ColumnId, bool),
    Help,
    Quit,
    Redraw,
}

fn index_arg(arg: Option<&str>, what: &str) -> Result<usize> {
    let arg = arg.ok_or_else(|| anyhow!("{} needs a row index", what))?;
    arg.parse().map_err(|_| anyhow!("Invalid row index: {}", arg))
}

fn count_arg(arg: Option<&str>) -> Result<usize> {
    match arg {
        Some(n) => n.parse().map_err(|_| anyhow!("Invalid count: {}", n)),
        None => Ok(1),
    }
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (word, rest) = match s.split_once(char::is_whitespace) {
            Some((w, r)) => (w, r.trim()),
            None => (s, ""),
        };
        let arg = if rest.is_empty() { None } else { Some(rest) };

        let command = match word {
            "" => Command::Redraw,
            "j" | "down" => Command::Down(count_arg(arg)?),
            "k" | "up" => Command::Up(count_arg(arg)?),
            "n" | "next" => Command::PageDown,
            "p" | "prev" => Command::PageUp,
            "g" | "top" => Command::Top,
            "x" | "select" => Command::Toggle(index_arg(arg, word)?),
            "selected" => Command::Selected,
            "clear" => Command::ClearSelection,
            "cancel" => Command::Cancel,
            "show" => Command::Show(index_arg(arg, word)?),
            "queue" => Command::Query(QueryChange::Queue(rest.to_string())),
            "jobset" => Command::Query(QueryChange::JobSet(rest.to_string())),
            "id" => Command::Query(QueryChange::JobId(rest.to_string())),
            "owner" => Command::Query(QueryChange::Owner(rest.to_string())),
            "states" => Command::Query(QueryChange::JobStates(parse_job_states(rest)?)),
            "order" => Command::Query(QueryChange::NewestFirst(parse_order(rest)?)),
            "r" | "refresh" => Command::Query(QueryChange::Refresh),
            "col" => {
                let (name, toggle) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| anyhow!("Usage: col <name> on|off"))?;
                let visible = match toggle.trim() {
                    "on" => true,
                    "off" => false,
                    other => return Err(anyhow!("Expected on or off, got {}", other)),
                };
                Command::Column(name.parse()?, visible)
            }
            "h" | "help" | "?" => Command::Help,
            "q" | "quit" => Command::Quit,
            other => return Err(anyhow!("Unknown command: {} (try help)", other)),
        };
        Ok(command)
    }
}

fn draw(view: &JobTableView<RemoteJobs>, errors: &[LoadError], status: &[String]) {
    println!("{}", view.render(&view.source().filter()));

    let window = view.visible_window();
    let total = if view.can_load_more() {
        format!("{}+", view.row_count().saturating_sub(1))
    } else {
        view.row_count().to_string()
    };
    let mut footer = format!(
        "rows {}-{} of {} | selected: {}",
        window.start,
        window.end.saturating_sub(1),
        total,
        view.selection().len()
    );
    if view.selection().can_cancel() {
        footer.push_str(" | cancel available");
    }
    println!("{}", footer);

    for e in errors {
        println!("! {} (scroll to retry)", e);
    }
    for line in status {
        println!("{}", line);
    }
}

/// Interactive loop: redraw, read one command, apply it.
pub async fn run(view: JobTableView<RemoteJobs>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut status: Vec<String> = Vec::new();

    loop {
        let errors = view.load_visible().await;
        draw(&view, &errors, &status);
        status.clear();

        print!("> ");
        std::io::stdout().flush()?;
        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };

        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                status.push(e.to_string());
                continue;
            }
        };

        match command {
            Command::Down(n) => view.scroll_by(n as isize),
            Command::Up(n) => view.scroll_by(-(n as isize)),
            Command::PageDown => view.page_down(),
            Command::PageUp => view.page_up(),
            Command::Top => view.scroll_to(0),
            Command::Toggle(index) => match view.toggle_row(index) {
                Some(true) => status.push(format!("Selected row {}", index)),
                Some(false) => status.push(format!("Unselected row {}", index)),
                None => status.push(format!("Row {} is not loaded", index)),
            },
            Command::Selected => {
                if view.selection().is_empty() {
                    status.push("No jobs selected".to_string());
                } else {
                    let jobs = view.selection().selected_jobs();
                    status.push(output::jobs_table(&jobs).to_string());
                }
            }
            Command::ClearSelection => {
                view.selection().clear();
                view.force_update();
            }
            Command::Cancel => {
                if !view.selection().can_cancel() {
                    status.push("No cancellable jobs selected".to_string());
                    continue;
                }
                let ids = view
                    .selection()
                    .selected_jobs()
                    .into_iter()
                    .filter(|job| job.state.is_cancellable())
                    .map(|job| job.id)
                    .collect();
                match view.source().client().cancel(ids).await {
                    Ok(cancelled) => {
                        status.push(format!("Cancelled {} jobs", cancelled.len()));
                        view.selection().clear();
                        if let Err(e) = view.on_query_change(QueryChange::Refresh).await {
                            status.push(format!("Refresh failed: {:#}", e));
                        }
                    }
                    Err(e) => status.push(format!("Cancel failed: {:#}", e)),
                }
            }
            Command::Show(index) => match view.row_at(index) {
                RowSlot::Loaded(job) => match view.source().client().get_job(job.id.clone()).await {
                    Ok(Some(fresh)) => status.push(output::job_detail(&fresh)),
                    Ok(None) => status.push(format!("Job {} no longer exists", job.id)),
                    Err(e) => {
                        log::warn!("Falling back to cached row for {}: {:#}", job.id, e);
                        status.push(output::job_detail(&job));
                    }
                },
                RowSlot::Pending => status.push(format!("Row {} is not loaded", index)),
            },
            Command::Query(change) => {
                if let Err(e) = view.on_query_change(change).await {
                    status.push(format!("Filter change failed: {:#}", e));
                }
            }
            Command::Column(column, visible) => view.set_column(column, visible),
            Command::Help => status.push(HELP.to_string()),
            Command::Quit => break,
            Command::Redraw => {}
        }
    }
    Ok(())
}
