use std::sync::Mutex;
use tracing::info;

use super::form::{ExtractedFields, ListingForm};
use super::resolver::IntentHost;

/// `IntentHost` that keeps navigation targets, the form and notices in memory.
///
/// Used by the CLI and the HTTP control surface, which have no screen to drive.
#[derive(Debug, Default)]
pub struct MemoryHost {
    form: Mutex<ListingForm>,
    targets: Mutex<Vec<String>>,
    notices: Mutex<Vec<String>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_form(form: ListingForm) -> Self {
        Self {
            form: Mutex::new(form),
            ..Self::default()
        }
    }

    pub fn form(&self) -> ListingForm {
        self.form.lock().map(|f| f.clone()).unwrap_or_default()
    }

    pub fn last_target(&self) -> Option<String> {
        self.targets.lock().ok().and_then(|t| t.last().cloned())
    }

    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

impl IntentHost for MemoryHost {
    fn on_navigate(&self, target: &str) {
        if let Ok(mut targets) = self.targets.lock() {
            targets.push(target.to_string());
        }
    }

    fn on_fields_extracted(&self, fields: &ExtractedFields) {
        if let Ok(mut form) = self.form.lock() {
            fields.merge_into(&mut form);
        }
    }

    fn on_notice(&self, message: &str) {
        info!("{}", message);
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(message.to_string());
        }
    }
}
