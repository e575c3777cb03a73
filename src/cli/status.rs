use crate::config::MonitorConfig;
use crate::models::{AgentRecord, DisplayState, SessionState};
use crate::monitor::overlay;
use crate::store::StateStore;
use crate::Result;
use chrono::Utc;
use colored::{ColoredString, Colorize};

pub fn run(config: &MonitorConfig, json: bool) -> Result<()> {
    let store = StateStore::new(config.state_path());
    let snapshot = overlay::decorate(&store.read(), Utc::now(), config.staleness_threshold());

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print!("{}", render(&snapshot));
    }

    Ok(())
}

fn colored_state(state: DisplayState) -> ColoredString {
    let text = state.as_str();
    match state {
        DisplayState::Waiting => text.bright_black(),
        DisplayState::Planning => text.cyan(),
        DisplayState::Working => text.blue(),
        DisplayState::PermissionWait => text.yellow().bold(),
        DisplayState::Completed => text.green(),
        DisplayState::Error => text.red(),
    }
}

fn record_line(record: &AgentRecord) -> String {
    let mut line = format!(
        "   {} {:<24} {}",
        record.icon,
        record.id,
        colored_state(record.display_state)
    );

    if let Some(label) = record.description.as_deref().or(record.last_tool.as_deref()) {
        line.push_str(&format!("  {}", label));
    }
    if record.tool_count > 0 {
        line.push_str(&format!(" ({} ops)", record.tool_count).bright_black().to_string());
    }

    line
}

/// Human-readable summary of a decorated snapshot
pub fn render(snapshot: &SessionState) -> String {
    let mut out = String::new();

    let session = snapshot.session_id().unwrap_or("-");
    out.push_str(&format!("{}\n\n", format!("Session: {}", session).cyan().bold()));

    if snapshot.agents().is_empty() {
        out.push_str(&format!("   {}\n", "No agents tracked".bright_black()));
    } else {
        let mut records: Vec<&AgentRecord> = snapshot.agents().values().collect();
        records.sort_by_key(|r| std::cmp::Reverse(r.updated_at));
        for record in records {
            out.push_str(&record_line(record));
            out.push('\n');
        }
    }

    let stats = snapshot.stats();
    out.push_str(&format!(
        "\n   Total: {}  waiting {}  planning {}  working {}  completed {}  error {}\n",
        stats.total, stats.waiting, stats.planning, stats.working, stats.completed, stats.error
    ));
    out.push_str(&format!(
        "   Updated: {}\n",
        snapshot.last_updated().format("%Y-%m-%d %H:%M:%S")
    ));

    let awaiting = overlay::awaiting_approval(snapshot);
    if awaiting > 0 {
        out.push_str(&format!(
            "   {}\n",
            format!("{} awaiting approval", awaiting).yellow()
        ));
    }

    out
}
