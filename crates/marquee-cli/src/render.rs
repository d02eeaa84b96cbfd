//! Plain-text output for the terminal.

use marquee_core::orchestrator::RunReport;
use marquee_runtime::{build_cards, relative_time, CardDescriptor, DisplaySnapshot};

pub fn print_snapshot(snapshot: &DisplaySnapshot) {
    let mut header = format!("{} [{}]", display_handle(&snapshot.handle), snapshot.state);
    if let Some(at) = &snapshot.fetched_at {
        header.push_str(&format!(" · updated {}", relative_time(at)));
    }
    if snapshot.stale {
        header.push_str(" · stale");
    }
    println!("{header}");

    for card in build_cards(snapshot) {
        match card {
            CardDescriptor::Item {
                index,
                title,
                subtitle,
                rating,
                ..
            } => match rating {
                Some(r) => println!("{index:>3}. {title} ({subtitle}) ★ {r}"),
                None => println!("{index:>3}. {title} ({subtitle})"),
            },
            CardDescriptor::Placeholder { title, message, .. } => {
                println!("     {title}: {message}");
            }
        }
    }

    if let (Some(detail), false) = (&snapshot.error_detail, snapshot.items.is_empty()) {
        println!("     last refresh failed: {detail}");
    }
}

pub fn print_report(report: &RunReport) {
    match &report.error {
        Some(e) => println!("{}: {} ({e})", report.handle, report.state),
        None => println!(
            "{}: {} · {} shown, {} unreleased, {} not found, {} failed",
            report.handle,
            report.state,
            report.resolved,
            report.unreleased,
            report.missed,
            report.failed
        ),
    }
}

fn display_handle(handle: &str) -> &str {
    if handle.is_empty() {
        "(not configured)"
    } else {
        handle
    }
}
