use crate::types::Submission;
use redis::{AsyncCommands, RedisResult};

/// Redis key layout for the graded-result mirror.
/// The session layer reads these keys; the grader only ever writes them.

pub const SUBMISSION_PREFIX: &str = "codegrade:submission";
pub const LATEST_PREFIX: &str = "codegrade:latest";

/// Key holding one submission by id
pub fn submission_key(submission_id: &uuid::Uuid) -> String {
    format!("{}:{}", SUBMISSION_PREFIX, submission_id)
}

/// Key holding the latest submission for an (attempt, question) pair
pub fn latest_key(attempt_id: &str, question_id: &str) -> String {
    format!("{}:{}:{}", LATEST_PREFIX, attempt_id, question_id)
}

fn serialization_error(e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, "serialization error", e.to_string()))
}

/// Mirror a graded submission. The latest-key is overwritten, the by-id key
/// is written once.
pub async fn store_submission(
    conn: &mut redis::aio::ConnectionManager,
    submission: &Submission,
    ttl_secs: u64,
) -> RedisResult<()> {
    let payload = serde_json::to_string(submission).map_err(serialization_error)?;

    let _: () = conn
        .set_ex(submission_key(&submission.id), &payload, ttl_secs)
        .await?;
    let _: () = conn
        .set_ex(
            latest_key(&submission.attempt_id, &submission.question_id),
            &payload,
            ttl_secs,
        )
        .await?;

    Ok(())
}

/// Retrieve the mirrored latest submission for an (attempt, question) pair
pub async fn get_latest(
    conn: &mut redis::aio::ConnectionManager,
    attempt_id: &str,
    question_id: &str,
) -> RedisResult<Option<Submission>> {
    let payload: Option<String> = conn.get(latest_key(attempt_id, question_id)).await?;

    match payload {
        Some(data) => {
            let submission: Submission = serde_json::from_str(&data).map_err(|e| {
                redis::RedisError::from((
                    redis::ErrorKind::TypeError,
                    "deserialization error",
                    e.to_string(),
                ))
            })?;
            Ok(Some(submission))
        }
        None => Ok(None),
    }
}
