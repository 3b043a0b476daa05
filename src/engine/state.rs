use std::fmt;

use serde::Serialize;
use time::OffsetDateTime;

use super::types::ExitTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    Pending,
    Signed,
    Sent,
    Confirmed,
    Error,
    Skipped,
}

impl ExitStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitStatus::Pending => "pending",
            ExitStatus::Signed => "signed",
            ExitStatus::Sent => "sent",
            ExitStatus::Confirmed => "confirmed",
            ExitStatus::Error => "error",
            ExitStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExitStatus::Confirmed | ExitStatus::Error | ExitStatus::Skipped
        )
    }

    fn rank(self) -> u8 {
        match self {
            ExitStatus::Pending => 0,
            ExitStatus::Signed => 1,
            ExitStatus::Sent => 2,
            ExitStatus::Confirmed | ExitStatus::Error | ExitStatus::Skipped => 3,
        }
    }

    /// 状态只能沿 pending → signed → sent → confirmed 前进，
    /// error / skipped 可从任意未终结状态进入，终结后不再变化。
    pub fn can_advance_to(self, next: ExitStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExitItem {
    #[serde(flatten)]
    pub task: ExitTask,
    pub status: ExitStatus,
    pub submission_id: Option<String>,
    pub error: Option<String>,
    /// 最近一次发送所用的费率。
    pub fee_level: Option<u64>,
    pub attempts: usize,
}

impl ExitItem {
    pub fn pending(task: ExitTask) -> Self {
        Self {
            task,
            status: ExitStatus::Pending,
            submission_id: None,
            error: None,
            fee_level: None,
            attempts: 0,
        }
    }

    /// 推进状态，返回是否实际发生了变化；回退或重复推进会被忽略。
    pub fn advance(&mut self, next: ExitStatus) -> bool {
        if self.status.can_advance_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        let changed = self.advance(ExitStatus::Error);
        if changed {
            self.error = Some(message.into());
        }
        changed
    }

    pub fn skip(&mut self, message: impl Into<String>) -> bool {
        let changed = self.advance(ExitStatus::Skipped);
        if changed {
            self.error = Some(message.into());
        }
        changed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Planning,
    Running,
    Error,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OrchestratorState {
    pub planning: bool,
    pub running: bool,
    pub items: Vec<ExitItem>,
    pub current_index: Option<usize>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
    /// 整轮被致命错误中止时的原因。
    pub error: Option<String>,
    pub cancelled: bool,
}

impl OrchestratorState {
    pub fn is_active(&self) -> bool {
        self.planning || self.running
    }

    pub fn phase(&self) -> RunPhase {
        if self.planning {
            RunPhase::Planning
        } else if self.running {
            RunPhase::Running
        } else if self.error.is_some() {
            RunPhase::Error
        } else {
            RunPhase::Idle
        }
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            total: self.items.len(),
            ..RunSummary::default()
        };
        for item in &self.items {
            match item.status {
                ExitStatus::Confirmed => summary.confirmed += 1,
                ExitStatus::Error => summary.failed += 1,
                ExitStatus::Skipped => summary.skipped += 1,
                ExitStatus::Pending | ExitStatus::Signed | ExitStatus::Sent => {
                    summary.in_flight += 1
                }
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub confirmed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub in_flight: usize,
}
