//! `classpulse praise` and `classpulse attention`

use anyhow::Result;
use clap::Args;
use classpulse_core::{ActionKind, ActionRequest, BatchActionResult, StudentOutcome};

use super::Backend;
use crate::config::ClasspulseConfig;

#[derive(Args, Debug)]
pub struct ActionArgs {
    #[arg(long)]
    pub school: u64,

    #[arg(long = "class")]
    pub class_id: u64,

    #[arg(long)]
    pub classroom: u64,

    #[arg(long)]
    pub teacher: u64,

    /// Students to act on
    #[arg(required = true)]
    pub students: Vec<u64>,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

impl ActionArgs {
    fn request(&self) -> ActionRequest {
        ActionRequest {
            school_id: self.school,
            class_id: self.class_id,
            classroom_id: self.classroom,
            teacher_id: self.teacher,
            student_ids: self.students.clone(),
        }
    }
}

pub async fn run(kind: ActionKind, args: ActionArgs, config: ClasspulseConfig) -> Result<()> {
    let backend = Backend::open_persistent(&config.storage).await?;
    let guard = backend.guard(&config);
    let request = args.request();

    let result = match kind {
        ActionKind::Praise => guard.praise(&request).await?,
        ActionKind::Attention => guard.attention(&request).await?,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render_result(&result));
    }

    if !result.success {
        anyhow::bail!("No student was {}", past_tense(kind));
    }
    Ok(())
}

fn past_tense(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Praise => "praised",
        ActionKind::Attention => "reminded",
    }
}

fn render_result(result: &BatchActionResult) -> String {
    let mut out = String::new();
    for student in &result.results {
        let line = match &student.outcome {
            StudentOutcome::Recorded { sub_type, message } => {
                format!("  student {:<8} ok       {:<16} {}\n", student.student_id, sub_type, message)
            }
            StudentOutcome::Rejected { reason } => {
                format!("  student {:<8} rejected {}\n", student.student_id, reason)
            }
        };
        out.push_str(&line);
    }
    out
}
