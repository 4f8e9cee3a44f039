// Integration tests for the parking sniper
// These drive the engine against a scripted page backed by real HTML

pub mod engine_scenarios;
pub mod settings_tests;

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use parking_sniper::activity::ActivityLog;
use parking_sniper::config::EngineTimings;
use parking_sniper::engine::{EngineContext, Orchestrator};
use parking_sniper::page::snapshot::{BUTTON_SELECTOR, PageSnapshot, SCHEDULE_ROW_SELECTOR};
use parking_sniper::page::{
    ChangeObserver, ControlInfo, ControlScope, ElementHandle, FieldInfo, ListingRow, PageAdapter,
    PageSignals,
};
use parking_sniper::{AppError, Result};

pub const SCHEDULE_HTML: &str = r#"
<html><body>
  <ol class="breadcrumb"><li class="breadcrumb-item active">Calendarios</li></ol>
  <table><tbody>
    <tr class="cursor-pointer"><td>Semestre I</td></tr>
    <tr class="cursor-pointer"><td>Semestre II</td></tr>
  </tbody></table>
</body></html>
"#;

pub const CATEGORY_HTML: &str = r#"
<html><body>
  <div class="h1 text-bold">Tipo de vehículo</div>
  <button class="btn btn-outline"><i class="fas fa-car"></i><span>Automóvil</span></button>
  <button class="btn btn-outline"><i class="fas fa-motorcycle"></i><span>Motocicleta</span></button>
</body></html>
"#;

pub const FORM_HTML: &str = r#"
<html><body>
  <form>
    <select name="tipoVehiculo">
      <option value="">--</option><option value="1">Automóvil</option><option value="2">Motocicleta</option>
    </select>
    <select name="marca"><option value="">--</option><option value="7">TOYOTA</option><option value="8">HONDA</option></select>
    <select name="tipoPlaca"><option value="">--</option><option value="P">P</option><option value="M">M</option></select>
    <select name="color"><option value="">--</option><option value="3">ROJO</option><option value="4">NEGRO</option></select>
    <input type="text" name="placa" maxlength="6">
    <input type="number" name="modelo">
    <button type="button" class="btn btn-secondary">Cancelar</button>
    <button type="submit" class="btn btn-primary">Reservar</button>
  </form>
</body></html>
"#;

/// Handle of the submit button in [`FORM_HTML`].
pub fn form_submit() -> ElementHandle {
    ElementHandle::new(BUTTON_SELECTOR, 1)
}

/// Listing page with one row per `(name, available)`. Each row carries a
/// "Comprar" button; the page has a logout button before the table.
pub fn listing_html(rows: &[(&str, u32)]) -> String {
    let body: String = rows
        .iter()
        .map(|(name, available)| {
            format!(
                r#"<tr>
                  <td><div class="flex-column"><a class="text-body"><h4>{}</h4></a></div></td>
                  <td><span class="badge badge-primary">Disponibles: {}</span></td>
                  <td><button class="btn btn-success">Comprar</button></td>
                </tr>"#,
                name, available
            )
        })
        .collect();
    format!(
        r#"<html><body>
          <ol class="breadcrumb"><li class="breadcrumb-item active">Oferta de parqueos</li></ol>
          <button class="btn btn-link">Salir</button>
          <table><tbody>{}</tbody></table>
        </body></html>"#,
        body
    )
}

/// Handle of the buy button in row `row` of [`listing_html`].
pub fn listing_buy_button(row: usize) -> ElementHandle {
    ElementHandle::new(BUTTON_SELECTOR, row + 1)
}

pub fn schedule_row(index: usize) -> ElementHandle {
    ElementHandle::new(SCHEDULE_ROW_SELECTOR, index)
}

/// Scripted stand-in for the live page. Reads go through the real HTML
/// snapshot parser; clicks and reloads swap documents.
pub struct FakePage {
    html: Mutex<String>,
    transitions: Mutex<HashMap<ElementHandle, String>>,
    reload_queue: Mutex<VecDeque<String>>,
    clicks: Mutex<Vec<ElementHandle>>,
    values: Mutex<Vec<(ElementHandle, String)>>,
    messages: Mutex<Vec<String>>,
    reloads: AtomicU32,
    list_calls: AtomicU32,
    read_latency: Mutex<Option<Duration>>,
    changed: Arc<Notify>,
}

impl FakePage {
    pub fn new(html: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            html: Mutex::new(html.into()),
            transitions: Mutex::new(HashMap::new()),
            reload_queue: Mutex::new(VecDeque::new()),
            clicks: Mutex::new(Vec::new()),
            values: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            reloads: AtomicU32::new(0),
            list_calls: AtomicU32::new(0),
            read_latency: Mutex::new(None),
            changed: Arc::new(Notify::new()),
        })
    }

    /// Clicking `handle` shows `html`.
    pub fn on_click(&self, handle: ElementHandle, html: impl Into<String>) {
        self.transitions.lock().unwrap().insert(handle, html.into());
    }

    /// The next reload shows `html`. Reloads past the queue keep the page.
    pub fn on_reload(&self, html: impl Into<String>) {
        self.reload_queue.lock().unwrap().push_back(html.into());
    }

    pub fn set_read_latency(&self, latency: Duration) {
        *self.read_latency.lock().unwrap() = Some(latency);
    }

    pub fn show(&self, html: impl Into<String>) {
        *self.html.lock().unwrap() = html.into();
        self.changed.notify_one();
    }

    pub fn clicks(&self) -> Vec<ElementHandle> {
        self.clicks.lock().unwrap().clone()
    }

    pub fn values(&self) -> Vec<(ElementHandle, String)> {
        self.values.lock().unwrap().clone()
    }

    pub fn value_of(&self, handle: &ElementHandle) -> Option<String> {
        self.values()
            .into_iter()
            .rev()
            .find(|(h, _)| h == handle)
            .map(|(_, value)| value)
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn reloads(&self) -> u32 {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn observer(&self) -> Arc<FakeObserver> {
        Arc::new(FakeObserver {
            changed: self.changed.clone(),
        })
    }

    fn snapshot(&self) -> PageSnapshot {
        PageSnapshot::parse(&self.html.lock().unwrap())
    }

    async fn latency(&self) {
        let latency = *self.read_latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl PageAdapter for FakePage {
    async fn signals(&self) -> Result<PageSignals> {
        self.snapshot().signals()
    }

    async fn list_rows(&self) -> Result<Vec<ListingRow>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.latency().await;
        self.snapshot().rows()
    }

    async fn controls(&self, scope: ControlScope) -> Result<Vec<ControlInfo>> {
        self.snapshot().controls(scope)
    }

    async fn fields(&self) -> Result<Vec<FieldInfo>> {
        self.snapshot().fields()
    }

    async fn set_field_value(&self, field: &ElementHandle, value: &str) -> Result<()> {
        self.values
            .lock()
            .unwrap()
            .push((field.clone(), value.to_string()));
        Ok(())
    }

    async fn trigger_change_events(&self, _field: &ElementHandle) -> Result<()> {
        Ok(())
    }

    async fn click(&self, control: &ElementHandle) -> Result<()> {
        self.clicks.lock().unwrap().push(control.clone());
        let next = self.transitions.lock().unwrap().get(control).cloned();
        if let Some(html) = next {
            self.show(html);
        }
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        let next = self.reload_queue.lock().unwrap().pop_front();
        match next {
            Some(html) => self.show(html),
            None => self.changed.notify_one(),
        }
        Ok(())
    }

    async fn page_html(&self) -> Result<String> {
        Ok(self.html.lock().unwrap().clone())
    }

    async fn show_message(&self, message: &str) -> Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

/// Change observer fired by every document swap of a [`FakePage`].
pub struct FakeObserver {
    changed: Arc<Notify>,
}

#[async_trait]
impl ChangeObserver for FakeObserver {
    async fn next_change(&self) -> Result<()> {
        self.changed.notified().await;
        Ok(())
    }
}

/// A page that fails every read, like one stuck mid-navigation.
pub struct BrokenPage;

#[async_trait]
impl PageAdapter for BrokenPage {
    async fn signals(&self) -> Result<PageSignals> {
        Err(AppError::TransientPage("document detached".to_string()))
    }

    async fn list_rows(&self) -> Result<Vec<ListingRow>> {
        Err(AppError::TransientPage("document detached".to_string()))
    }

    async fn controls(&self, _scope: ControlScope) -> Result<Vec<ControlInfo>> {
        Err(AppError::TransientPage("document detached".to_string()))
    }

    async fn fields(&self) -> Result<Vec<FieldInfo>> {
        Err(AppError::TransientPage("document detached".to_string()))
    }

    async fn set_field_value(&self, _field: &ElementHandle, _value: &str) -> Result<()> {
        Err(AppError::TransientPage("document detached".to_string()))
    }

    async fn trigger_change_events(&self, _field: &ElementHandle) -> Result<()> {
        Ok(())
    }

    async fn click(&self, _control: &ElementHandle) -> Result<()> {
        Err(AppError::TransientPage("document detached".to_string()))
    }

    async fn reload(&self) -> Result<()> {
        Ok(())
    }

    async fn page_html(&self) -> Result<String> {
        Err(AppError::TransientPage("document detached".to_string()))
    }

    async fn show_message(&self, _message: &str) -> Result<()> {
        Ok(())
    }
}

/// Engine around `page` with default timings, snapshots off.
pub fn engine(page: Arc<dyn PageAdapter>) -> Orchestrator {
    engine_with(page, ActivityLog::default(), |ctx| ctx)
}

pub fn engine_with<F>(page: Arc<dyn PageAdapter>, activity: ActivityLog, customize: F) -> Orchestrator
where
    F: FnOnce(EngineContext) -> EngineContext,
{
    let ctx = customize(EngineContext::new(page, activity, EngineTimings::default()));
    Orchestrator::new(ctx.into_shared())
}

/// Forwards the fake page's change notifications into the engine.
pub fn forward_changes(orchestrator: &Orchestrator, page: &FakePage) {
    let forwarder = orchestrator.clone();
    let observer = page.observer();
    tokio::spawn(async move {
        forwarder
            .run_observer(parking_sniper::page::page_changes(observer))
            .await
    });
}
