//! Member point-add batch body.
//!
//! Reads `member_info` rows, validates each record, adds a campaign bonus to
//! members whose target flag is set, and writes the results back in chunks.
//! Records rejected by validation are skipped rather than written, which
//! surfaces as a written != read mismatch in the step counters.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use sqlx::{PgPool, Row};
use thiserror::Error;
use tracing::{debug, warn};

use super::{StepCatalog, StepRunner};
use crate::exit_status::StepExecution;
use crate::queue::JobParameters;

/// Runner kind referenced by job module descriptors.
pub const RUNNER_KIND: &str = "point_add_chunk";

const TARGET_STATUS: &str = "1";
const INITIAL_STATUS: &str = "0";
const GOLD_MEMBER: &str = "G";
const NORMAL_MEMBER: &str = "N";
const GOLD_BONUS: i32 = 100;
const NORMAL_BONUS: i32 = 10;
const MAX_POINT: i32 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: i64,
    pub member_type: String,
    pub status: String,
    pub point: i32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("member type must be G or N, got {0:?}")]
    InvalidType(String),
    #[error("status flag must be 0 or 1, got {0:?}")]
    InvalidStatus(String),
    #[error("point {0} is outside 0..={MAX_POINT}")]
    PointOutOfRange(i32),
}

pub fn validate(member: &Member) -> Result<(), ValidationError> {
    if member.member_type != GOLD_MEMBER && member.member_type != NORMAL_MEMBER {
        return Err(ValidationError::InvalidType(member.member_type.clone()));
    }
    if member.status != TARGET_STATUS && member.status != INITIAL_STATUS {
        return Err(ValidationError::InvalidStatus(member.status.clone()));
    }
    if !(0..=MAX_POINT).contains(&member.point) {
        return Err(ValidationError::PointOutOfRange(member.point));
    }
    Ok(())
}

/// Apply the point bonus to a validated member. Non-target members pass
/// through unchanged but are still written.
#[must_use]
pub fn process(mut member: Member) -> Member {
    if member.status == TARGET_STATUS {
        match member.member_type.as_str() {
            GOLD_MEMBER => member.point += GOLD_BONUS,
            NORMAL_MEMBER => member.point += NORMAL_BONUS,
            _ => {}
        }
        if member.point > MAX_POINT {
            member.point = MAX_POINT;
        }
        member.status = INITIAL_STATUS.to_string();
    }
    member
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PointAddOptions {
    chunk_size: usize,
}

impl Default for PointAddOptions {
    fn default() -> Self {
        Self { chunk_size: 10 }
    }
}

/// Chunk-oriented point-add step over the `member_info` table.
pub struct PointAddStep {
    pool: PgPool,
    chunk_size: usize,
}

impl PointAddStep {
    #[must_use]
    pub fn new(pool: PgPool, chunk_size: usize) -> Self {
        Self { pool, chunk_size }
    }

    async fn fetch_members(&self) -> Result<Vec<Member>> {
        let rows = sqlx::query(
            r#"
            SELECT id, type, status, point
            FROM member_info
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch member_info rows")?;

        let mut members = Vec::with_capacity(rows.len());
        for row in rows {
            members.push(Member {
                id: row.try_get("id").context("failed to get member id")?,
                member_type: row.try_get("type").context("failed to get member type")?,
                status: row.try_get("status").context("failed to get member status")?,
                point: row.try_get("point").context("failed to get member point")?,
            });
        }
        Ok(members)
    }

    async fn write_chunk(&self, chunk: &[Member]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin member_info write transaction")?;
        for member in chunk {
            sqlx::query(
                r"
                UPDATE member_info
                SET status = $2, point = $3
                WHERE id = $1
                ",
            )
            .bind(member.id)
            .bind(&member.status)
            .bind(member.point)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to write member {}", member.id))?;
        }
        tx.commit()
            .await
            .context("failed to commit member_info chunk")?;
        Ok(())
    }
}

#[async_trait]
impl StepRunner for PointAddStep {
    async fn run(&self, step_name: &str, _parameters: &JobParameters) -> Result<StepExecution> {
        let members = self.fetch_members().await?;

        let mut read_count = 0;
        let mut write_count = 0;
        let mut skip_count = 0;
        let mut buffer = Vec::with_capacity(self.chunk_size);

        for member in members {
            read_count += 1;
            if let Err(error) = validate(&member) {
                warn!(
                    member_id = member.id,
                    %error,
                    "member rejected by validation, skipping"
                );
                skip_count += 1;
                continue;
            }
            buffer.push(process(member));
            if buffer.len() == self.chunk_size {
                self.write_chunk(&buffer).await?;
                write_count += buffer.len() as u64;
                buffer.clear();
            }
        }
        if !buffer.is_empty() {
            self.write_chunk(&buffer).await?;
            write_count += buffer.len() as u64;
        }

        debug!(step = step_name, read_count, write_count, skip_count, "point-add step finished");

        Ok(StepExecution {
            step_name: step_name.to_string(),
            read_count,
            write_count,
            skip_count,
        })
    }
}

/// Register the point-add runner kind against the shared database pool.
pub fn register(catalog: &mut StepCatalog, pool: PgPool) {
    catalog.register(RUNNER_KIND, move |options| {
        let options: PointAddOptions = serde_yaml::from_value(options.clone())
            .context("invalid point_add_chunk options")?;
        anyhow::ensure!(options.chunk_size > 0, "chunk_size must be positive");
        Ok(Arc::new(PointAddStep::new(pool.clone(), options.chunk_size)) as Arc<dyn StepRunner>)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(member_type: &str, status: &str, point: i32) -> Member {
        Member {
            id: 1,
            member_type: member_type.to_string(),
            status: status.to_string(),
            point,
        }
    }

    #[test]
    fn gold_target_member_gains_100_and_flag_resets() {
        let updated = process(member("G", "1", 500));
        assert_eq!(updated.point, 600);
        assert_eq!(updated.status, "0");
    }

    #[test]
    fn normal_target_member_gains_10() {
        let updated = process(member("N", "1", 500));
        assert_eq!(updated.point, 510);
    }

    #[test]
    fn non_target_member_is_unchanged() {
        let original = member("G", "0", 500);
        assert_eq!(process(original.clone()), original);
    }

    #[test]
    fn point_is_capped_at_maximum() {
        let updated = process(member("G", "1", MAX_POINT - 1));
        assert_eq!(updated.point, MAX_POINT);
    }

    #[test]
    fn validation_rejects_unknown_type() {
        assert_eq!(
            validate(&member("X", "1", 0)),
            Err(ValidationError::InvalidType("X".to_string()))
        );
    }

    #[test]
    fn validation_rejects_unknown_status() {
        assert_eq!(
            validate(&member("G", "2", 0)),
            Err(ValidationError::InvalidStatus("2".to_string()))
        );
    }

    #[test]
    fn validation_rejects_point_out_of_range() {
        assert_eq!(
            validate(&member("G", "1", MAX_POINT + 1)),
            Err(ValidationError::PointOutOfRange(MAX_POINT + 1))
        );
        assert_eq!(
            validate(&member("G", "1", -1)),
            Err(ValidationError::PointOutOfRange(-1))
        );
    }
}
