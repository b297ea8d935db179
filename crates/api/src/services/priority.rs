//! Priority oracle port: an AI-backed chat adapter with a deterministic
//! fallback. All envelope building and response parsing stays in this module;
//! the pipeline only sees a complete `task_id → score` map.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use cadence_domain::ProjectAllocationInput;

/// Task view handed to the oracle and the fallback scorer.
#[derive(Debug, Clone)]
pub struct PriorityTaskContext {
    pub id: Uuid,
    pub title: String,
    pub remaining_hours: f64,
    /// 1 = highest, 5 = lowest.
    pub user_priority: i16,
    pub due_at: Option<DateTime<Utc>>,
    pub project_id: Option<Uuid>,
    pub project_title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PriorityContext {
    pub week_start: NaiveDate,
    pub tasks: Vec<PriorityTaskContext>,
    pub allocations: HashMap<Uuid, ProjectAllocationInput>,
}

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("oracle connection failed: {0}")]
    Connection(String),
    #[error("oracle authentication failed: {0}")]
    Auth(String),
    #[error("oracle rate limit exceeded")]
    RateLimited,
    #[error("oracle request timed out")]
    Timeout,
    #[error("oracle returned a malformed response: {0}")]
    Malformed(String),
}

/// Returns a priority score in [0, 10] per task.
#[async_trait]
pub trait PriorityOracle: Send + Sync {
    async fn priorities(
        &self,
        context: &PriorityContext,
        user_prompt: Option<&str>,
    ) -> Result<HashMap<Uuid, f64>, OracleError>;
}

/// Chat-completions adapter. Sends the planning context as a structured
/// envelope and expects a single `task_priorities` tool call back.
pub struct ChatOracle {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatOracle {
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    fn build_envelope(
        &self,
        context: &PriorityContext,
        user_prompt: Option<&str>,
    ) -> serde_json::Value {
        let tasks: Vec<_> = context
            .tasks
            .iter()
            .map(|task| {
                json!({
                    "task_id": task.id,
                    "title": task.title,
                    "remaining_hours": task.remaining_hours,
                    "user_priority": task.user_priority,
                    "due_at": task.due_at,
                    "project": task.project_title,
                })
            })
            .collect();
        let allocations: Vec<_> = context
            .allocations
            .values()
            .map(|a| {
                json!({
                    "project_id": a.project_id,
                    "target_hours": a.target_hours,
                    "priority_weight": a.priority_weight,
                })
            })
            .collect();

        json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a weekly planning assistant. Score each task's \
                                scheduling priority from 0 (skip this week) to 10 (must \
                                do first). Respond only via the task_priorities tool.",
                },
                {
                    "role": "user",
                    "content": json!({
                        "week_start_date": context.week_start.to_string(),
                        "tasks": tasks,
                        "project_allocations": allocations,
                        "user_prompt": user_prompt,
                    })
                    .to_string(),
                },
            ],
            "tools": [{
                "type": "function",
                "function": {
                    "name": "task_priorities",
                    "description": "Report a priority score for every task",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "task_priorities": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "task_id": {"type": "string"},
                                        "priority_score": {
                                            "type": "number",
                                            "minimum": 0,
                                            "maximum": 10,
                                        },
                                    },
                                    "required": ["task_id", "priority_score"],
                                },
                            },
                        },
                        "required": ["task_priorities"],
                    },
                },
            }],
            "tool_choice": {"type": "function", "function": {"name": "task_priorities"}},
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct PriorityArguments {
    task_priorities: Vec<PriorityEntry>,
}

#[derive(Debug, Deserialize)]
struct PriorityEntry {
    task_id: Uuid,
    priority_score: f64,
}

#[async_trait]
impl PriorityOracle for ChatOracle {
    async fn priorities(
        &self,
        context: &PriorityContext,
        user_prompt: Option<&str>,
    ) -> Result<HashMap<Uuid, f64>, OracleError> {
        let envelope = self.build_envelope(context, user_prompt);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout
                } else {
                    OracleError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status.as_u16() {
                401 | 403 => OracleError::Auth(status.to_string()),
                429 => OracleError::RateLimited,
                code => OracleError::Connection(format!("HTTP {code}")),
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| OracleError::Malformed(e.to_string()))?;

        let tool_call = body
            .choices
            .first()
            .and_then(|c| c.message.tool_calls.first())
            .ok_or_else(|| OracleError::Malformed("missing tool call".to_string()))?;

        let arguments: PriorityArguments = serde_json::from_str(&tool_call.function.arguments)
            .map_err(|e| OracleError::Malformed(e.to_string()))?;

        Ok(arguments
            .task_priorities
            .into_iter()
            .map(|entry| (entry.task_id, entry.priority_score.clamp(0.0, 10.0)))
            .collect())
    }
}

/// Deterministic fallback scorer. Identical input yields identical scores.
pub fn fallback_priorities(context: &PriorityContext) -> HashMap<Uuid, f64> {
    let mut priorities = HashMap::with_capacity(context.tasks.len());
    for task in &context.tasks {
        let mut score = 10.0 - (task.user_priority as f64 - 1.0) * 2.0;

        if let Some(due_at) = task.due_at {
            let days_until_due = (due_at.date_naive() - context.week_start).num_days();
            if days_until_due <= 3 {
                score += 3.0;
            } else if days_until_due <= 7 {
                score += 2.0;
            } else if days_until_due <= 14 {
                score += 1.0;
            }
        }

        if let Some(allocation) = task
            .project_id
            .and_then(|project| context.allocations.get(&project))
        {
            score += allocation.priority_weight * 2.0;
        }

        if task.remaining_hours > 0.0 {
            if task.remaining_hours <= 2.0 {
                score += 1.0;
            } else if task.remaining_hours >= 8.0 {
                score -= 0.5;
            }
        }

        priorities.insert(task.id, score.clamp(0.0, 10.0));
    }
    priorities
}

/// User-visible insight strings attached as warnings when the oracle fails
/// and the deterministic fallback takes over.
pub fn oracle_failure_insights(error: &OracleError) -> Vec<String> {
    match error {
        OracleError::Connection(_) | OracleError::Timeout => vec![
            "Could not reach the AI priority service.".to_string(),
            "Check your internet connection and try again in a moment.".to_string(),
            "Planning continued with deterministic priority scoring.".to_string(),
        ],
        OracleError::Auth(_) => vec![
            "The AI priority service rejected the configured credentials.".to_string(),
            "Verify the API key in your settings.".to_string(),
            "Planning continued with deterministic priority scoring.".to_string(),
        ],
        OracleError::RateLimited => vec![
            "The AI priority service rate limit was reached.".to_string(),
            "Wait a few minutes before planning again.".to_string(),
            "Planning continued with deterministic priority scoring.".to_string(),
        ],
        OracleError::Malformed(_) => vec![
            "The AI priority service is temporarily unavailable.".to_string(),
            "Planning continued with deterministic priority scoring.".to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn context(tasks: Vec<PriorityTaskContext>) -> PriorityContext {
        PriorityContext {
            week_start: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            tasks,
            allocations: HashMap::new(),
        }
    }

    fn task(priority: i16, remaining: f64) -> PriorityTaskContext {
        PriorityTaskContext {
            id: Uuid::new_v4(),
            title: "t".to_string(),
            remaining_hours: remaining,
            user_priority: priority,
            due_at: None,
            project_id: None,
            project_title: None,
        }
    }

    #[test]
    fn base_score_follows_user_priority() {
        let tasks = vec![task(1, 4.0), task(3, 4.0), task(5, 4.0)];
        let ids: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();
        let scores = fallback_priorities(&context(tasks));

        assert_eq!(scores[&ids[0]], 10.0);
        assert_eq!(scores[&ids[1]], 6.0);
        assert_eq!(scores[&ids[2]], 2.0);
    }

    #[test]
    fn deadline_urgency_is_tiered() {
        let mut due_soon = task(3, 4.0);
        due_soon.due_at = Some(Utc.with_ymd_and_hms(2025, 3, 5, 12, 0, 0).unwrap());
        let mut due_next_week = task(3, 4.0);
        due_next_week.due_at = Some(Utc.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap());
        let mut due_later = task(3, 4.0);
        due_later.due_at = Some(Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).unwrap());

        let ids = [due_soon.id, due_next_week.id, due_later.id];
        let scores = fallback_priorities(&context(vec![due_soon, due_next_week, due_later]));

        assert_eq!(scores[&ids[0]], 9.0); // +3
        assert_eq!(scores[&ids[1]], 8.0); // +2
        assert_eq!(scores[&ids[2]], 7.0); // +1
    }

    #[test]
    fn size_bonus_and_penalty() {
        let small = task(3, 1.5);
        let large = task(3, 9.0);
        let ids = [small.id, large.id];
        let scores = fallback_priorities(&context(vec![small, large]));

        assert_eq!(scores[&ids[0]], 7.0); // +1
        assert_eq!(scores[&ids[1]], 5.5); // -0.5
    }

    #[test]
    fn allocation_weight_adds_bonus_and_scores_clamp() {
        let project_id = Uuid::new_v4();
        let mut urgent = task(1, 1.0);
        urgent.project_id = Some(project_id);
        urgent.due_at = Some(Utc.with_ymd_and_hms(2025, 3, 4, 0, 0, 0).unwrap());
        let id = urgent.id;

        let mut ctx = context(vec![urgent]);
        ctx.allocations.insert(
            project_id,
            ProjectAllocationInput {
                project_id,
                target_hours: 10.0,
                max_hours: 15.0,
                priority_weight: 0.8,
            },
        );

        // 10 + 3 + 1.6 + 1 clamps to 10.
        assert_eq!(fallback_priorities(&ctx)[&id], 10.0);
    }

    #[test]
    fn fallback_is_deterministic() {
        let tasks = vec![task(2, 3.0), task(4, 6.0)];
        let ctx = context(tasks);
        assert_eq!(fallback_priorities(&ctx), fallback_priorities(&ctx));
    }
}
