use crate::commands::{with_migrated_pool, CommandResult};

pub fn run() -> CommandResult {
    match with_migrated_pool("migrate", |_pool| async {
        Ok("applied pending migrations".to_string())
    }) {
        Ok(message) => CommandResult::success("migrate", message),
        Err(failure) => failure,
    }
}
