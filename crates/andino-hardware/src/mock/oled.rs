//! Mock OLED panel.

use std::sync::{Arc, Mutex};

use crate::traits::OledPanel;
use crate::{Result, lock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OledCall {
    Mode { mode: String, arg: Option<String> },
    Text(Vec<Vec<String>>),
}

/// Records every call; clones share the record.
#[derive(Debug, Clone, Default)]
pub struct MockOled {
    calls: Arc<Mutex<Vec<OledCall>>>,
}

impl MockOled {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<OledCall> {
        lock(&self.calls).clone()
    }
}

impl OledPanel for MockOled {
    async fn set_mode(&self, mode: &str, arg: Option<&str>) -> Result<()> {
        lock(&self.calls).push(OledCall::Mode {
            mode: mode.to_string(),
            arg: arg.map(str::to_string),
        });
        Ok(())
    }

    async fn set_text(&self, lines: &[Vec<String>]) -> Result<()> {
        lock(&self.calls).push(OledCall::Text(lines.to_vec()));
        Ok(())
    }
}
