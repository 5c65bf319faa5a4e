//! `classpulse signals`

use anyhow::Result;
use clap::Args;
use classpulse_core::{ClassroomReport, ClassroomSignals};

use super::Backend;
use crate::config::ClasspulseConfig;

#[derive(Args, Debug)]
pub struct SignalsArgs {
    /// Classroom to scan
    #[arg(long)]
    pub classroom: u64,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: SignalsArgs, config: ClasspulseConfig) -> Result<()> {
    let backend = Backend::open_persistent(&config.storage).await?;
    let signals = ClassroomSignals::new(backend.store.clone(), backend.guard(&config));
    let report = signals.scan(args.classroom).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

pub fn print_report(report: &ClassroomReport) {
    print!("{}", render_report(report));
}

fn render_report(report: &ClassroomReport) -> String {
    let mut out = format!("Classroom {}\n", report.classroom_id);

    out.push_str("\nPraise-worthy:\n");
    if report.praise_worthy.is_empty() {
        out.push_str("  (none)\n");
    }
    for candidate in &report.praise_worthy {
        out.push_str(&format!(
            "  student {:<8} {:<16} score {:>4}  {}\n",
            candidate.student_id,
            candidate.praise_type.as_str(),
            candidate.score,
            candidate.message
        ));
    }

    out.push_str("\nNeeds attention:\n");
    if report.need_attention.is_empty() {
        out.push_str("  (none)\n");
    }
    for candidate in &report.need_attention {
        out.push_str(&format!(
            "  student {:<8} {:<16} score {:>4}  {}\n",
            candidate.student_id,
            candidate.attention_type.as_str(),
            candidate.score,
            candidate.message
        ));
    }
    out
}
