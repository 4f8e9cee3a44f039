//! Claims a found space: clicks its buy button, fills the completion form
//! from the vehicle profile and submits it when the space is a priority
//! target.
//!
//! The run's timers are already gone when this starts. The form lock is held
//! for the whole attempt and released by [`FormLock`]'s `Drop` on every exit.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

use super::matching::{Strategy, first_match};
use super::state::AcquisitionState;
use super::wait::{poll_attempts, wait_for};
use super::{EngineContext, METRIC_AUTO_SUBMISSIONS};
use crate::models::{AvailabilityEvent, EngineConfig, VehicleProfile, normalize_name};
use crate::page::{ControlInfo, ControlScope, FieldInfo, FieldKind, SelectOption};
use crate::utils::error::{AppError, Result};

const BUY_KEYWORDS: &[&str] = &["comprar", "reservar"];
const SUBMIT_KEYWORDS: &[&str] = &[
    "reservar", "confirmar", "comprar", "guardar", "enviar", "continuar", "aceptar", "submit",
];
const PRIMARY_CLASSES: &[&str] = &["btn-success", "btn-primary"];

const CATEGORY_TOKENS: &[&str] = &["tipo", "vehiculo", "categoria", "vehicle"];
const BRAND_TOKENS: &[&str] = &["marca", "brand"];
const PLATE_PREFIX_TOKENS: &[&str] = &["prefijo", "tipoplaca", "prefix", "plate_type"];
const COLOR_TOKENS: &[&str] = &["color"];
const PLATE_TOKENS: &[&str] = &["placa", "plate"];
const MODEL_TOKENS: &[&str] = &["modelo", "model", "año", "anio", "year"];
const OTHER_COLOR_TOKENS: &[&str] = &["otro", "other", "color"];

const FALLBACK_PLATE: &str = "ABC123";
const FALLBACK_MODEL: &str = "2020";
const FALLBACK_COLOR: &str = "NEGRO";

/// What a form field is for. Checked most specific first: a plate-prefix
/// select named `tipoPlaca` must not be taken for the vehicle-type select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldRole {
    PlatePrefix,
    Color,
    Brand,
    Category,
    PlateNumber,
    Model,
}

fn field_role(field: &FieldInfo) -> Option<FieldRole> {
    match field.kind {
        FieldKind::Select => {
            if field.mentions_any(PLATE_PREFIX_TOKENS) {
                Some(FieldRole::PlatePrefix)
            } else if field.mentions_any(COLOR_TOKENS) {
                Some(FieldRole::Color)
            } else if field.mentions_any(BRAND_TOKENS) {
                Some(FieldRole::Brand)
            } else if field.mentions_any(CATEGORY_TOKENS) {
                Some(FieldRole::Category)
            } else {
                None
            }
        }
        FieldKind::Text | FieldKind::Number => {
            if field.mentions_any(PLATE_TOKENS) {
                Some(FieldRole::PlateNumber)
            } else if field.kind == FieldKind::Number || field.mentions_any(MODEL_TOKENS) {
                Some(FieldRole::Model)
            } else {
                None
            }
        }
    }
}

fn find_role(fields: &[FieldInfo], role: FieldRole) -> Option<&FieldInfo> {
    fields.iter().find(|f| field_role(f) == Some(role))
}

/// Picks the option matching `wanted` by text or value, else the first real
/// option after the placeholder.
fn pick_option<'a>(options: &'a [SelectOption], wanted: &str) -> Option<&'a SelectOption> {
    let wanted = wanted.trim().to_lowercase();
    if !wanted.is_empty() {
        let exact = options
            .iter()
            .find(|o| o.text.to_lowercase() == wanted || o.value.to_lowercase() == wanted);
        if exact.is_some() {
            return exact;
        }
        let partial = options
            .iter()
            .find(|o| !o.value.is_empty() && o.text.to_lowercase().contains(&wanted));
        if partial.is_some() {
            return partial;
        }
    }
    options.get(1)
}

/// Splits a plate into its letter prefix and the rest: `P123ABC` becomes
/// (`P`, `123ABC`).
fn split_plate(plate: &str) -> (String, String) {
    let plate = plate.trim().to_uppercase();
    match plate.find(|c: char| c.is_ascii_digit()) {
        Some(index) => (plate[..index].to_string(), plate[index..].to_string()),
        None => (String::new(), plate),
    }
}

fn truncate(value: &str, max_length: Option<usize>) -> String {
    match max_length {
        Some(max) => value.chars().take(max).collect(),
        None => value.to_string(),
    }
}

fn or_fallback<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() { fallback } else { value.trim() }
}

fn buy_button_strategies() -> Vec<Strategy<'static, ControlInfo>> {
    vec![
        Strategy::new("primary-style", |c: &ControlInfo| {
            c.visible && PRIMARY_CLASSES.iter().any(|class| c.has_class(class))
        }),
        Strategy::new("buy-keyword", |c: &ControlInfo| {
            c.visible && BUY_KEYWORDS.iter().any(|k| c.text_contains(k))
        }),
    ]
}

fn submit_strategies() -> Vec<Strategy<'static, ControlInfo>> {
    vec![
        Strategy::new("form-submit", |c: &ControlInfo| {
            c.visible && c.in_form && c.input_type.as_deref() == Some("submit")
        }),
        Strategy::new("primary-style", |c: &ControlInfo| {
            c.visible && PRIMARY_CLASSES.iter().any(|class| c.has_class(class))
        }),
        Strategy::new("submit-keyword", |c: &ControlInfo| {
            c.visible && SUBMIT_KEYWORDS.iter().any(|k| c.text_contains(k))
        }),
    ]
}

/// Holds the form lock; dropping it releases the lock.
struct FormLock {
    ctx: Arc<EngineContext>,
}

impl FormLock {
    fn acquire(ctx: Arc<EngineContext>) -> Self {
        {
            let mut state = ctx.state();
            state.form_lock_active = true;
            state.teardown_timers();
        }
        Self { ctx }
    }
}

impl Drop for FormLock {
    fn drop(&mut self) {
        self.ctx.state().form_lock_active = false;
    }
}

#[derive(Clone)]
pub struct AcquisitionEngine {
    ctx: Arc<EngineContext>,
}

impl AcquisitionEngine {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Runs the acquisition after the configured short delay.
    pub fn spawn(self, event: AvailabilityEvent, generation: u64) -> JoinHandle<AcquisitionState> {
        tokio::spawn(async move {
            sleep(self.ctx.timings.acquisition_delay()).await;
            self.run(event, generation).await
        })
    }

    pub async fn run(&self, event: AvailabilityEvent, generation: u64) -> AcquisitionState {
        if self.ctx.state().generation != generation {
            debug!("Acquisition for {} superseded by a new run", event.entry.name);
            return AcquisitionState::Idle;
        }

        let _lock = FormLock::acquire(self.ctx.clone());
        self.ctx
            .activity
            .info("Poll timer and watchdog stopped; form protected against reloads");
        self.ctx.activity.info("Starting automatic acquisition");

        let config = self.ctx.config();
        let outcome = match self.drive(&event, &config).await {
            Ok(state) => state,
            Err(e) => {
                self.ctx.report("Acquisition", &e);
                AcquisitionState::Failed
            }
        };
        self.set_state(outcome);
        outcome
    }

    fn set_state(&self, state: AcquisitionState) {
        debug!("Acquisition state: {:?}", state);
        self.ctx.state().acquisition = state;
    }

    async fn drive(&self, event: &AvailabilityEvent, config: &EngineConfig) -> Result<AcquisitionState> {
        let page = &self.ctx.page;
        let timings = &self.ctx.timings;

        self.set_state(AcquisitionState::ButtonSearch);
        let button = self.find_buy_button(&event.entry.name).await?;
        self.ctx
            .activity
            .info(format!("Clicking '{}'", button.text));
        page.click(&button.handle).await?;

        self.set_state(AcquisitionState::FormLoadWait);
        let loaded = wait_for(timings.form_load_wait(), timings.readiness_poll(), || async {
            matches!(page.fields().await, Ok(fields) if !fields.is_empty())
        })
        .await;
        if !loaded {
            self.ctx.activity.info(format!(
                "Form fields not detected after {}ms, continuing",
                timings.form_load_wait_ms
            ));
        }
        self.save_snapshot().await;

        self.set_state(AcquisitionState::Filling);
        let fields = page.fields().await?;
        if fields.is_empty() {
            return Err(AppError::Acquisition(
                "no fillable fields on the completion form".to_string(),
            ));
        }
        self.ctx
            .activity
            .info(format!("Filling form ({} fields)", fields.len()));
        self.fill_fields(&fields, config).await;

        self.set_state(AcquisitionState::ColorWait);
        let known: HashSet<String> = fields.iter().map(FieldInfo::identifier).collect();
        self.fill_color(&config.vehicle_profile, &known).await;

        self.set_state(AcquisitionState::SubmitSearch);
        sleep(timings.submit_delay()).await;
        let submit = page
            .find_control(ControlScope::Buttons, &submit_strategies())
            .await?
            .ok_or_else(|| AppError::Acquisition("no submit control found".to_string()))?;
        self.ctx
            .activity
            .info(format!("Submit control: '{}'", submit.text));

        if event.is_priority {
            self.ctx.activity.info("Priority parking: submitting automatically");
            page.click(&submit.handle).await?;
            metrics::counter!(METRIC_AUTO_SUBMISSIONS).increment(1);
            self.ctx
                .activity
                .info("Automatic booking submitted; check the next screen to confirm");
            Ok(AcquisitionState::AutoSubmitted)
        } else {
            self.ctx.activity.info("Form filled; not a priority parking, leaving it for review");
            self.ctx.activity.info(format!(
                "Review the data and click '{}' if you want this parking",
                submit.text
            ));
            Ok(AcquisitionState::AwaitingManual)
        }
    }

    async fn find_buy_button(&self, name: &str) -> Result<ControlInfo> {
        let rows = self.ctx.page.list_rows().await?;
        let strategies = buy_button_strategies();

        let candidates: Vec<ControlInfo> = rows
            .into_iter()
            .filter(|row| row.name.as_deref().map(normalize_name).as_deref() == Some(name))
            .flat_map(|row| row.controls)
            .collect();

        match first_match(&strategies, &candidates) {
            Some((strategy, control)) => {
                debug!("Buy button matched by {}", strategy);
                Ok(control.clone())
            }
            None => {
                self.ctx.activity.error("No visible buy button found");
                Err(AppError::not_found(format!("buy button for {}", name)))
            }
        }
    }

    /// Sets a field and fires its change events. Failures are logged and
    /// the fill moves on.
    async fn set_field(&self, field: &FieldInfo, value: &str, what: &str) {
        let page = &self.ctx.page;
        let result = async {
            page.set_field_value(&field.handle, value).await?;
            page.trigger_change_events(&field.handle).await
        }
        .await;

        match result {
            Ok(()) => self.ctx.activity.info(format!("  {} -> \"{}\"", what, value)),
            Err(e) => self.ctx.report(&format!("Setting {}", what), &e),
        }
    }

    async fn select_option(&self, field: Option<&FieldInfo>, wanted: &str, what: &str) {
        let Some(field) = field else {
            self.ctx.activity.info(format!("  {} field not found, skipped", what));
            return;
        };
        match pick_option(&field.options, wanted) {
            Some(option) => {
                let value = option.value.clone();
                self.set_field(field, &value, what).await;
            }
            None => self
                .ctx
                .activity
                .info(format!("  {} has a single option, skipped", what)),
        }
    }

    async fn fill_fields(&self, fields: &[FieldInfo], config: &EngineConfig) {
        let profile = &config.vehicle_profile;
        let (prefix, remainder) = split_plate(or_fallback(&profile.plate, FALLBACK_PLATE));
        let prefix_field = find_role(fields, FieldRole::PlatePrefix);

        self.select_option(
            find_role(fields, FieldRole::Category),
            config.vehicle_category.label(),
            "Vehicle type",
        )
        .await;
        self.select_option(find_role(fields, FieldRole::Brand), &profile.brand, "Brand")
            .await;
        if prefix_field.is_some() {
            self.select_option(prefix_field, &prefix, "Plate prefix").await;
        }

        match find_role(fields, FieldRole::PlateNumber) {
            Some(field) => {
                let plate = if prefix_field.is_some() {
                    remainder
                } else {
                    format!("{}{}", prefix, remainder)
                };
                self.set_field(field, &truncate(&plate, field.max_length), "Plate")
                    .await;
            }
            None => self.ctx.activity.info("  Plate field not found, skipped"),
        }

        match find_role(fields, FieldRole::Model) {
            Some(field) => {
                self.set_field(field, or_fallback(&profile.model, FALLBACK_MODEL), "Model/year")
                    .await
            }
            None => self.ctx.activity.info("  Model field not found, skipped"),
        }
    }

    /// Waits for the colour options that load after the brand is chosen.
    async fn fill_color(&self, profile: &VehicleProfile, known: &HashSet<String>) {
        let page = &self.ctx.page;
        let timings = &self.ctx.timings;

        let loaded = poll_attempts(timings.color_wait_attempts, timings.color_wait_interval(), || async {
            let fields = page.fields().await.ok()?;
            find_role(&fields, FieldRole::Color)
                .filter(|f| f.options.len() > 1)
                .cloned()
        })
        .await;

        if let Some(color) = loaded {
            self.select_option(Some(&color), &profile.color, "Color").await;
            return;
        }

        self.ctx.activity.info("Color options did not load, using fallback");
        let current = match page.fields().await {
            Ok(fields) => fields,
            Err(e) => {
                self.ctx.report("Color fallback", &e);
                Vec::new()
            }
        };
        if let Some(color) = find_role(&current, FieldRole::Color) {
            if let Some(only) = color.options.first() {
                let value = only.value.clone();
                self.set_field(color, &value, "Color").await;
            }
        }

        let other = poll_attempts(timings.other_color_attempts, timings.other_color_interval(), || async {
            let fields = page.fields().await.ok()?;
            fields
                .into_iter()
                .find(|f| f.is_text_like() && !known.contains(&f.identifier()) && f.mentions_any(OTHER_COLOR_TOKENS))
        })
        .await;

        match other {
            Some(field) => {
                self.set_field(&field, or_fallback(&profile.color, FALLBACK_COLOR), "Other color")
                    .await
            }
            None => debug!("No free-text color field appeared"),
        }
    }

    async fn save_snapshot(&self) {
        if !self.ctx.snapshots.enabled {
            return;
        }
        let result = async {
            let html = self.ctx.page.page_html().await?;
            let directory = PathBuf::from(&self.ctx.snapshots.directory);
            tokio::fs::create_dir_all(&directory).await?;
            let path = directory.join(format!(
                "form-{}-{}.html",
                chrono::Utc::now().format("%Y%m%d_%H%M%S"),
                crate::models::generate_id()
            ));
            tokio::fs::write(&path, html).await?;
            Ok::<_, AppError>(path)
        }
        .await;

        match result {
            Ok(path) => self
                .ctx
                .activity
                .info(format!("Form HTML saved to {}", path.display())),
            Err(e) => self.ctx.report("Saving form HTML", &e),
        }
    }
}
