use std::path::PathBuf;

use hxsetup_util::step::StepCommands;

use crate::error::{CacheError, Result};

pub const PRIMARY_KEY: &str = "PRIMARY_KEY";
pub const RESTORE_RESULT: &str = "RESTORE_RESULT";
pub const HAXELIB_PATH: &str = "HAXELIB_PATH";

/// Values handed from the setup step to the post step of the same run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedCacheState {
    pub primary_key: String,
    /// Key that satisfied the restore; `None` means nothing was restored.
    pub restore_result: Option<String>,
    pub haxelib_path: PathBuf,
}

impl PersistedCacheState {
    pub fn load(commands: &dyn StepCommands) -> Result<Self> {
        let primary_key = commands
            .get_state(PRIMARY_KEY)?
            .ok_or(CacheError::MissingState { name: PRIMARY_KEY })?;
        let haxelib_path = commands
            .get_state(HAXELIB_PATH)?
            .ok_or(CacheError::MissingState { name: HAXELIB_PATH })?;
        Ok(Self {
            primary_key,
            restore_result: commands.get_state(RESTORE_RESULT)?,
            haxelib_path: PathBuf::from(haxelib_path),
        })
    }

    /// `true` when the exact primary key was restored, so there is nothing new to upload.
    pub fn is_exact_hit(&self) -> bool {
        self.restore_result.as_deref() == Some(self.primary_key.as_str())
    }
}
