//! User-facing reply texts.

use uuid::Uuid;

use crate::queue::model::StatusCounts;
use crate::queue::progress::BatchSummary;

pub const ACK: &str = "🔖 Processing your message...";
pub const NO_TASKS: &str = "❌ No tasks could be identified in your message.";
pub const ENQUEUE_FAILED: &str = "❌ Failed to queue your tasks. Please try again.";
pub const PROGRESS_UNAVAILABLE: &str =
    "⚠️ Lost track of your batch's progress. Use /status to check the queue.";

pub fn unknown_command(command: &str) -> String {
    format!("🤷 Unknown command {command}. Use /help to see what I can do.")
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

pub fn batch_started(count: usize, batch_id: Uuid) -> String {
    format!(
        "🔄 Processing batch of {}...\n\nBatch ID: {batch_id}",
        plural(count, "task", "tasks")
    )
}

/// Per-status breakdown; zero counts are left out.
pub fn progress(counts: &StatusCounts) -> String {
    let mut text = format!("🔄 Processing tasks ({} total):\n\n", counts.total());
    for (n, label) in [
        (counts.complete, "✅ Completed"),
        (counts.running, "⚙️ Processing"),
        (counts.pending, "⏳ Pending"),
        (counts.failed, "❌ Failed"),
    ] {
        if n > 0 {
            text.push_str(&format!("{label}: {n}\n"));
        }
    }
    text
}

pub fn batch_complete(summary: &BatchSummary) -> String {
    let mut text = String::from("✅ Batch processing complete!\n\n");
    text.push_str(&format!("Total tasks: {}\n", summary.total));
    text.push_str(&format!("✅ Successfully processed: {}\n", summary.succeeded));
    if summary.failed > 0 {
        text.push_str(&format!("❌ Failed: {}\n", summary.failed));
        text.push_str("\nPlease check the sheet for details on failed tasks.");
    }
    text
}

pub fn batch_timed_out(counts: &StatusCounts) -> String {
    format!(
        "⏱️ Your batch is taking longer than expected ({} of {} done). \
         It will keep processing; use /status to check on the queue.",
        counts.complete + counts.failed,
        counts.total()
    )
}

/// `/status` reply. `queue` is `None` when the counts could not be read.
pub fn status(sheet_connected: bool, queue: Option<&StatusCounts>) -> String {
    if !sheet_connected {
        return "⚠️ Bot is running but the Google Sheets connection failed.".to_string();
    }

    let mut text = String::from("✅ Bot is running and connected to Google Sheets!");
    let Some(counts) = queue else {
        return text;
    };

    text.push_str("\n\n📊 Current Queue Status:\n");
    if counts.total() == 0 {
        text.push_str("Queue is empty.\n");
    }
    for (n, label) in [
        (counts.pending, "⏳ Pending"),
        (counts.running, "⚙️ Processing"),
        (counts.complete, "✅ Completed"),
        (counts.failed, "❌ Failed"),
    ] {
        if n > 0 {
            text.push_str(&format!("{label}: {}\n", plural(n, "task", "tasks")));
        }
    }
    text
}

pub const START: &str = r#"👋 Welcome to the TODO Bot!

I capture tasks from your messages and save them to Google Sheets. Send one task or a whole batch.

Single task:
"Johnny to ask Lexi what she wants for dinner"

Several tasks:
"Review the proposal AND send feedback to client"

Or bullet points:
- First task here
- Second task there

Use /help for more examples and commands."#;

pub const HELP: &str = r#"🤖 TODO Bot Commands:

/start - Show welcome message
/help - Show this help
/status - Check sheet connection and queue

📝 How to use:
Send any message describing tasks and I'll parse and save them.

Single task examples:
• "Lilly to reach out to Johnny for a quote"
• "Team needs to review the quarterly budget"

Batch examples:
• Tasks joined with AND:
  "Call the vendor AND review the contract"

• Narrative:
  "Gemma will ask oxccu for press release points. Lilly will draft the press release by friday."

• Bullet points:
  - Gemma to find out how much a clown costs
  - Client to get back to us by tuesday on budget
  - Everyone to brainstorm three themes

Each task is processed separately and you'll get progress updates until the batch is done."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_omits_zero_counts() {
        let counts = StatusCounts {
            pending: 1,
            running: 0,
            complete: 2,
            failed: 0,
        };
        let text = progress(&counts);
        assert!(text.contains("(3 total)"));
        assert!(text.contains("✅ Completed: 2"));
        assert!(text.contains("⏳ Pending: 1"));
        assert!(!text.contains("Processing:"));
        assert!(!text.contains("Failed"));
    }

    #[test]
    fn completion_reports_failures() {
        let summary = BatchSummary {
            total: 2,
            succeeded: 1,
            failed: 1,
            complete: true,
        };
        let text = batch_complete(&summary);
        assert!(text.contains("Total tasks: 2"));
        assert!(text.contains("Successfully processed: 1"));
        assert!(text.contains("❌ Failed: 1"));
        assert!(text.contains("check the sheet"));
    }

    #[test]
    fn completion_without_failures_is_short() {
        let summary = BatchSummary {
            total: 3,
            succeeded: 3,
            failed: 0,
            complete: true,
        };
        assert!(!batch_complete(&summary).contains("Failed"));
    }

    #[test]
    fn batch_started_pluralizes() {
        assert!(batch_started(1, Uuid::nil()).contains("batch of 1 task..."));
        assert!(batch_started(3, Uuid::nil()).contains("batch of 3 tasks..."));
    }

    #[test]
    fn status_variants() {
        assert!(status(false, None).starts_with("⚠️"));
        assert!(!status(true, None).contains("Queue Status"));

        let counts = StatusCounts {
            pending: 1,
            ..Default::default()
        };
        let text = status(true, Some(&counts));
        assert!(text.contains("⏳ Pending: 1 task\n"));
        assert!(status(true, Some(&StatusCounts::default())).contains("Queue is empty"));
    }
}
