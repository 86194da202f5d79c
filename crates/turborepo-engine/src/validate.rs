//! A task name carrying the package-qualifier delimiter would be ambiguous
//! once flattened into a `pkg#task` id, so it's rejected up front rather
//! than silently mis-parsed later.

use turborepo_task_id::TASK_DELIMITER;

pub fn validate_task_name(name: &str) -> Result<(), String> {
    if name.contains(TASK_DELIMITER) {
        return Err(format!(
            "task name `{name}` may not contain `{TASK_DELIMITER}`"
        ));
    }
    Ok(())
}
