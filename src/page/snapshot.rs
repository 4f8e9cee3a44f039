//! Reads the portal's HTML into the plain data the engine works with.
//!
//! The Chrome adapter fetches `document.documentElement.outerHTML`, parses it
//! here and hands out [`ElementHandle`]s that address the same elements with
//! `document.querySelectorAll(selector)[index]` when an action is needed.

use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;

use super::{
    ControlInfo, ControlScope, ElementHandle, FieldInfo, FieldKind, ListingRow, PageSignals,
    SelectOption,
};
use crate::models::{normalize_name, parse_available_count};
use crate::utils::error::{AppError, Result};

pub const BREADCRUMB_SELECTOR: &str = ".breadcrumb-item.active";
pub const HEADING_SELECTOR: &str = ".h1.text-bold";
pub const BADGE_SELECTOR: &str = ".badge.badge-primary";
pub const LISTING_ROW_SELECTOR: &str = "table tbody tr";
pub const ROW_NAME_SELECTOR: &str = ".flex-column .text-body h4";
pub const SCHEDULE_ROW_SELECTOR: &str = "table tbody tr.cursor-pointer";
pub const BUTTON_SELECTOR: &str = r#"button, input[type="submit"], input[type="button"]"#;
pub const LABEL_SELECTOR: &str = "span";
pub const SELECT_SELECTOR: &str = "select";
pub const TEXT_INPUT_SELECTOR: &str =
    r#"input[type="text"], input[type="number"], input:not([type])"#;

const PLATE_TOKENS: &[&str] = &["placa", "plate"];

fn css(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| AppError::Browser(format!("Invalid CSS selector '{}': {:?}", selector, e)))
}

fn element_text(element: &ElementRef) -> String {
    normalize_name(&element.text().collect::<Vec<_>>().join(" "))
}

fn attr(element: &ElementRef, name: &str) -> String {
    element.value().attr(name).unwrap_or_default().to_string()
}

fn is_hidden(element: &ElementRef) -> bool {
    let value = element.value();
    if value.classes().any(|c| c == "d-none") || value.attr("hidden").is_some() {
        return true;
    }
    value
        .attr("style")
        .map(|style| style.replace(' ', "").to_lowercase().contains("display:none"))
        .unwrap_or(false)
}

/// Hidden itself or inside a hidden ancestor.
fn is_visible(element: &ElementRef) -> bool {
    if is_hidden(element) {
        return false;
    }
    !element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| is_hidden(&ancestor))
}

fn in_form(element: &ElementRef) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| ancestor.value().name() == "form")
}

fn icon_classes(element: &ElementRef) -> Vec<String> {
    let mut icons: Vec<String> = element
        .descendants()
        .filter_map(ElementRef::wrap)
        .flat_map(|node| {
            node.value()
                .classes()
                .filter(|c| c.starts_with("fa-"))
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect();
    icons.dedup();
    icons
}

fn control_info(element: &ElementRef, handle: ElementHandle) -> ControlInfo {
    let input_type = element.value().attr("type").map(|t| t.to_lowercase());
    let mut text = element_text(element);
    if text.is_empty() && element.value().name() == "input" {
        text = normalize_name(&attr(element, "value"));
    }

    ControlInfo {
        handle,
        text,
        classes: element.value().classes().map(str::to_string).collect(),
        icon_classes: icon_classes(element),
        input_type,
        visible: is_visible(element),
        in_form: in_form(element),
    }
}

/// One parsed copy of the page.
pub struct PageSnapshot {
    document: Html,
}

impl PageSnapshot {
    pub fn parse(html: &str) -> Self {
        Self {
            document: Html::parse_document(html),
        }
    }

    fn first_text(&self, selector: &str) -> Result<Option<String>> {
        let selector = css(selector)?;
        Ok(self
            .document
            .select(&selector)
            .next()
            .map(|element| element_text(&element)))
    }

    fn exists(&self, selector: &str) -> Result<bool> {
        let selector = css(selector)?;
        Ok(self.document.select(&selector).next().is_some())
    }

    pub fn signals(&self) -> Result<PageSignals> {
        let badge_selector = css(BADGE_SELECTOR)?;
        let availability_badges = self
            .document
            .select(&badge_selector)
            .filter(|badge| parse_available_count(&element_text(badge)).is_some())
            .count();

        let has_completion_form = self
            .fields()?
            .iter()
            .any(|field| field.mentions_any(PLATE_TOKENS));

        Ok(PageSignals {
            breadcrumb: self.first_text(BREADCRUMB_SELECTOR)?,
            heading: self.first_text(HEADING_SELECTOR)?,
            availability_badges,
            has_car_icon: self.exists(".fa-car")?,
            has_motorcycle_icon: self.exists(".fa-motorcycle")?,
            has_completion_form,
        })
    }

    /// Listing rows in render order, each with the buttons it contains.
    pub fn rows(&self) -> Result<Vec<ListingRow>> {
        let row_selector = css(LISTING_ROW_SELECTOR)?;
        let name_selector = css(ROW_NAME_SELECTOR)?;
        let badge_selector = css(BADGE_SELECTOR)?;
        let button_selector = css(BUTTON_SELECTOR)?;

        // Row buttons must be addressed by their page-wide index.
        let button_index: HashMap<_, usize> = self
            .document
            .select(&button_selector)
            .enumerate()
            .map(|(index, button)| (button.id(), index))
            .collect();

        let rows = self
            .document
            .select(&row_selector)
            .map(|row| {
                let controls = row
                    .select(&button_selector)
                    .filter_map(|button| {
                        let index = *button_index.get(&button.id())?;
                        Some(control_info(
                            &button,
                            ElementHandle::new(BUTTON_SELECTOR, index),
                        ))
                    })
                    .collect();

                ListingRow {
                    name: row.select(&name_selector).next().map(|e| element_text(&e)),
                    available_text: row.select(&badge_selector).next().map(|e| element_text(&e)),
                    controls,
                }
            })
            .collect();

        Ok(rows)
    }

    pub fn controls(&self, scope: ControlScope) -> Result<Vec<ControlInfo>> {
        let selector_text = match scope {
            ControlScope::Buttons => BUTTON_SELECTOR,
            ControlScope::Labels => LABEL_SELECTOR,
            ControlScope::ScheduleRows => SCHEDULE_ROW_SELECTOR,
        };
        let selector = css(selector_text)?;

        Ok(self
            .document
            .select(&selector)
            .enumerate()
            .map(|(index, element)| control_info(&element, ElementHandle::new(selector_text, index)))
            .collect())
    }

    /// Selects first, then text-like inputs.
    pub fn fields(&self) -> Result<Vec<FieldInfo>> {
        let select_selector = css(SELECT_SELECTOR)?;
        let input_selector = css(TEXT_INPUT_SELECTOR)?;
        let option_selector = css("option")?;

        let mut fields: Vec<FieldInfo> = self
            .document
            .select(&select_selector)
            .enumerate()
            .map(|(index, select)| FieldInfo {
                handle: ElementHandle::new(SELECT_SELECTOR, index),
                kind: FieldKind::Select,
                name: attr(&select, "name"),
                id: attr(&select, "id"),
                placeholder: attr(&select, "placeholder"),
                options: select
                    .select(&option_selector)
                    .map(|option| {
                        let text = element_text(&option);
                        SelectOption {
                            value: option
                                .value()
                                .attr("value")
                                .map(str::to_string)
                                .unwrap_or_else(|| text.clone()),
                            text,
                        }
                    })
                    .collect(),
                max_length: None,
            })
            .collect();

        fields.extend(
            self.document
                .select(&input_selector)
                .enumerate()
                .map(|(index, input)| {
                    let kind = match input.value().attr("type") {
                        Some(t) if t.eq_ignore_ascii_case("number") => FieldKind::Number,
                        _ => FieldKind::Text,
                    };
                    FieldInfo {
                        handle: ElementHandle::new(TEXT_INPUT_SELECTOR, index),
                        kind,
                        name: attr(&input, "name"),
                        id: attr(&input, "id"),
                        placeholder: attr(&input, "placeholder"),
                        options: Vec::new(),
                        max_length: input
                            .value()
                            .attr("maxlength")
                            .and_then(|m| m.trim().parse().ok())
                            .filter(|m: &usize| *m > 0),
                    }
                }),
        );

        Ok(fields)
    }
}
