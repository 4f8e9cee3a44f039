//! Boundary to the live reservation page.
//!
//! The engine never touches the DOM directly. Everything it observes or does
//! goes through [`PageAdapter`], so the state machine can be driven by a real
//! Chromium tab ([`chrome::ChromePageAdapter`]) or by a scripted fake in tests.

pub mod chrome;
pub mod observer;
pub mod snapshot;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::engine::classifier;
use crate::engine::matching::{Strategy, first_match};
use crate::models::PageKind;
use crate::utils::error::Result;

pub use observer::{ChangeObserver, page_changes};

/// Locator for one element: the `index`-th match of `selector`, in document
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    pub selector: String,
    pub index: usize,
}

impl ElementHandle {
    pub fn new(selector: impl Into<String>, index: usize) -> Self {
        Self {
            selector: selector.into(),
            index,
        }
    }
}

/// Structural markers the classifier looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSignals {
    pub breadcrumb: Option<String>,
    pub heading: Option<String>,
    /// Badges carrying an availability count.
    pub availability_badges: usize,
    pub has_car_icon: bool,
    pub has_motorcycle_icon: bool,
    pub has_completion_form: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlScope {
    /// Buttons and button-like inputs.
    Buttons,
    /// Free-standing text labels (spans).
    Labels,
    /// Clickable schedule rows.
    ScheduleRows,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlInfo {
    pub handle: ElementHandle,
    pub text: String,
    pub classes: Vec<String>,
    /// Icon classes (`fa-*`) found inside the control.
    pub icon_classes: Vec<String>,
    pub input_type: Option<String>,
    pub visible: bool,
    pub in_form: bool,
}

impl Default for ElementHandle {
    fn default() -> Self {
        Self::new("", 0)
    }
}

impl ControlInfo {
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn has_icon(&self, icon: &str) -> bool {
        self.icon_classes.iter().any(|c| c == icon)
    }

    pub fn text_contains(&self, keyword: &str) -> bool {
        self.text.to_lowercase().contains(&keyword.to_lowercase())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRow {
    pub name: Option<String>,
    pub available_text: Option<String>,
    pub controls: Vec<ControlInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Select,
    Text,
    Number,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub handle: ElementHandle,
    pub kind: FieldKind,
    pub name: String,
    pub id: String,
    pub placeholder: String,
    pub options: Vec<SelectOption>,
    pub max_length: Option<usize>,
}

impl FieldInfo {
    /// Stable identifier used to recognise the field across re-reads.
    pub fn identifier(&self) -> String {
        if !self.name.is_empty() {
            self.name.clone()
        } else if !self.id.is_empty() {
            self.id.clone()
        } else {
            self.placeholder.clone()
        }
    }

    /// True when name, id or placeholder contains any of the tokens.
    pub fn mentions_any(&self, tokens: &[&str]) -> bool {
        let haystack = format!("{} {} {}", self.name, self.id, self.placeholder).to_lowercase();
        tokens.iter().any(|token| haystack.contains(token))
    }

    pub fn is_text_like(&self) -> bool {
        matches!(self.kind, FieldKind::Text | FieldKind::Number)
    }
}

/// Capability the engine needs from the external page.
#[async_trait]
pub trait PageAdapter: Send + Sync {
    async fn signals(&self) -> Result<PageSignals>;

    async fn classify_page(&self) -> Result<PageKind> {
        Ok(classifier::classify(&self.signals().await?))
    }

    async fn list_rows(&self) -> Result<Vec<ListingRow>>;

    async fn controls(&self, scope: ControlScope) -> Result<Vec<ControlInfo>>;

    /// Runs the strategies in priority order over the controls in `scope`;
    /// the first strategy with a hit wins.
    async fn find_control<'s>(
        &self,
        scope: ControlScope,
        strategies: &[Strategy<'s, ControlInfo>],
    ) -> Result<Option<ControlInfo>> {
        let controls = self.controls(scope).await?;
        Ok(first_match(strategies, &controls).map(|(_, control)| control.clone()))
    }

    async fn fields(&self) -> Result<Vec<FieldInfo>>;

    async fn set_field_value(&self, field: &ElementHandle, value: &str) -> Result<()>;

    /// Fires input, change and blur so the page's framework registers a value.
    async fn trigger_change_events(&self, field: &ElementHandle) -> Result<()>;

    async fn click(&self, control: &ElementHandle) -> Result<()>;

    async fn reload(&self) -> Result<()>;

    async fn page_html(&self) -> Result<String>;

    /// Shows a modal message to whoever is watching the page.
    async fn show_message(&self, message: &str) -> Result<()>;
}
