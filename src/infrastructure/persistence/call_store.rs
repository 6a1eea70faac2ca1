use crate::domain::entities::{Agent, AgentPresence, Call, CallStatus, QueueEntry};
use crate::domain::errors::{DispatchError, DispatchResult};
use crate::domain::ports::Ledger;
use crate::infrastructure::persistence::{parse_optional_timestamp, parse_timestamp, Database};
use async_trait::async_trait;
use sqlx::any::AnyRow;
use sqlx::Row;

impl Database {
    fn call_from_row(row: &AnyRow) -> DispatchResult<Call> {
        let status: String = row.try_get("status")?;
        let start_time: String = row.try_get("start_time")?;
        Ok(Call {
            id: row.try_get("call_id")?,
            caller_number: row.try_get("caller_number")?,
            called_number: row.try_get("called_number")?,
            customer_id: row.try_get("customer_id").ok(),
            agent_id: row.try_get("agent_id").ok(),
            status: status.parse::<CallStatus>().map_err(DispatchError::Upstream)?,
            start_time: parse_timestamp(&start_time)?,
            answer_time: parse_optional_timestamp(row.try_get("answer_time").ok())?,
            end_time: parse_optional_timestamp(row.try_get("end_time").ok())?,
            queue_time_secs: row.try_get("queue_time")?,
            talk_duration_secs: row.try_get("talk_duration")?,
            notes: row.try_get("notes").ok(),
            recording_url: row.try_get("recording_url").ok(),
        })
    }
}

#[async_trait]
impl Ledger for Database {
    async fn save_call(&self, call: &Call) -> DispatchResult<()> {
        sqlx::query(
            "INSERT INTO calls (call_id, caller_number, called_number, customer_id, agent_id,
                                status, start_time, answer_time, end_time, queue_time,
                                talk_duration, notes, recording_url)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(call_id) DO UPDATE SET
                caller_number = excluded.caller_number,
                called_number = excluded.called_number,
                customer_id = excluded.customer_id,
                agent_id = excluded.agent_id,
                status = excluded.status,
                start_time = excluded.start_time,
                answer_time = excluded.answer_time,
                end_time = excluded.end_time,
                queue_time = excluded.queue_time,
                talk_duration = excluded.talk_duration,
                notes = excluded.notes,
                recording_url = excluded.recording_url",
        )
        .bind(&call.id)
        .bind(&call.caller_number)
        .bind(&call.called_number)
        .bind(&call.customer_id)
        .bind(&call.agent_id)
        .bind(call.status.to_string())
        .bind(call.start_time.to_rfc3339())
        .bind(call.answer_time.map(|t| t.to_rfc3339()))
        .bind(call.end_time.map(|t| t.to_rfc3339()))
        .bind(call.queue_time_secs)
        .bind(call.talk_duration_secs)
        .bind(&call.notes)
        .bind(&call.recording_url)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_agent(&self, agent: &Agent) -> DispatchResult<()> {
        sqlx::query(
            "INSERT INTO agents (id, user_id, status, current_call_id, total_calls,
                                 total_talk_time, avg_handle_time, priority, last_activity,
                                 shift_start, shift_end)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                status = excluded.status,
                current_call_id = excluded.current_call_id,
                total_calls = excluded.total_calls,
                total_talk_time = excluded.total_talk_time,
                avg_handle_time = excluded.avg_handle_time,
                priority = excluded.priority,
                last_activity = excluded.last_activity,
                shift_start = excluded.shift_start,
                shift_end = excluded.shift_end",
        )
        .bind(&agent.id)
        .bind(&agent.user_id)
        .bind(agent.status.to_string())
        .bind(&agent.current_call_id)
        .bind(agent.total_calls)
        .bind(agent.total_talk_secs)
        .bind(agent.avg_handle_secs)
        .bind(agent.priority)
        .bind(agent.last_activity.to_rfc3339())
        .bind(agent.shift_start.map(|t| t.to_rfc3339()))
        .bind(agent.shift_end.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn replace_queue(&self, entries: &[QueueEntry]) -> DispatchResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM call_queue").execute(&mut *tx).await?;
        for entry in entries {
            sqlx::query(
                "INSERT INTO call_queue (call_id, caller_number, priority, queue_position,
                                         estimated_wait_time, queued_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&entry.call_id)
            .bind(&entry.caller_number)
            .bind(entry.priority)
            .bind(entry.position)
            .bind(entry.estimated_wait_secs)
            .bind(entry.queued_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn call_history(&self, page: i64, per_page: i64) -> DispatchResult<(Vec<Call>, i64)> {
        let page = page.max(1);
        let per_page = per_page.max(1);

        let count_row = sqlx::query("SELECT COUNT(*) AS total FROM calls")
            .fetch_one(&self.pool)
            .await?;
        let total_count: i64 = count_row.try_get("total")?;

        let rows = sqlx::query(
            "SELECT call_id, caller_number, called_number, customer_id, agent_id, status,
                    start_time, answer_time, end_time, queue_time, talk_duration, notes,
                    recording_url
             FROM calls
             ORDER BY start_time DESC, call_id DESC
             LIMIT ? OFFSET ?",
        )
        .bind(per_page)
        .bind((page - 1) * per_page)
        .fetch_all(&self.pool)
        .await?;

        let mut calls = Vec::with_capacity(rows.len());
        for row in &rows {
            calls.push(Self::call_from_row(row)?);
        }

        Ok((calls, total_count))
    }
}

// Not part of the Ledger trait: used by tests and operational tooling to
// inspect persisted agent rows without going through the dispatcher.
impl Database {
    pub async fn load_agent(&self, agent_id: &str) -> DispatchResult<Option<Agent>> {
        let row = sqlx::query(
            "SELECT id, user_id, status, current_call_id, total_calls, total_talk_time,
                    avg_handle_time, priority, last_activity, shift_start, shift_end
             FROM agents
             WHERE id = ?",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            let status: String = row.try_get("status")?;
            let last_activity: String = row.try_get("last_activity")?;
            Ok(Some(Agent {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                status: status
                    .parse::<AgentPresence>()
                    .map_err(DispatchError::Upstream)?,
                current_call_id: row.try_get("current_call_id").ok(),
                total_calls: row.try_get("total_calls")?,
                total_talk_secs: row.try_get("total_talk_time")?,
                avg_handle_secs: row.try_get("avg_handle_time")?,
                priority: row.try_get("priority")?,
                last_activity: parse_timestamp(&last_activity)?,
                shift_start: parse_optional_timestamp(row.try_get("shift_start").ok())?,
                shift_end: parse_optional_timestamp(row.try_get("shift_end").ok())?,
            }))
        } else {
            Ok(None)
        }
    }
}
