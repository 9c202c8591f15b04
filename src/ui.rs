use colored::{ColoredString, Colorize};
use reconciler::{ResourceStatus, Verb};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Resource rendering
// ============================================================================

/// Marker for a terminal status
pub fn status_icon(status: ResourceStatus, verb: Option<Verb>) -> ColoredString {
    match (status, verb) {
        (ResourceStatus::Applied, Some(Verb::NoOp)) => "○".dimmed(),
        (ResourceStatus::Applied, _) => "✓".green(),
        (ResourceStatus::Failed, _) => "✗".red(),
        (ResourceStatus::Skipped, _) => "⊘".yellow(),
        _ => "·".dimmed(),
    }
}

/// `+ create`, `~ update`, `- delete`, colored
pub fn verb_label(verb: Verb) -> ColoredString {
    let label = format!("{} {}", verb.symbol(), verb);
    match verb {
        Verb::Create => label.green(),
        Verb::Update => label.yellow(),
        Verb::Delete => label.red(),
        Verb::NoOp => label.dimmed(),
    }
}

/// Human-readable elapsed time
pub fn format_duration_ms(ms: u64) -> String {
    if ms >= 60_000 {
        format!("{}m{:02}s", ms / 60_000, (ms % 60_000) / 1000)
    } else if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{ms}ms")
    }
}

/// Pluralize `resource`
pub fn resources(count: usize) -> String {
    if count == 1 {
        "1 resource".to_string()
    } else {
        format!("{count} resources")
    }
}

// ============================================================================
// Tests
// ============================================================================
