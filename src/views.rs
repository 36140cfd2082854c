#![cfg(feature = "web")]

use crate::error::{AppError, Result};
use crate::model::{Dashboard, ItemInput, ProjectDetail, ProjectWithTotal};
use crate::section::SectionState;
use axum::response::Html;
use handlebars::Handlebars;
use serde::Serialize;
use std::collections::BTreeSet;

/// Compiled page templates.
pub struct Views {
    registry: Handlebars<'static>,
}

impl Views {
    pub fn new() -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);

        let partials = [
            ("header", include_str!("./templates/header.hbs")),
            ("footer", include_str!("./templates/footer.hbs")),
        ];
        for (name, source) in partials {
            registry
                .register_partial(name, source)
                .map_err(|e| AppError::Render(e.to_string()))?;
        }

        let templates = [
            ("login", include_str!("./templates/login.hbs")),
            ("dashboard", include_str!("./templates/dashboard.hbs")),
            ("new_project", include_str!("./templates/new_project.hbs")),
            ("project", include_str!("./templates/project.hbs")),
        ];
        for (name, source) in templates {
            registry
                .register_template_string(name, source)
                .map_err(|e| AppError::Render(e.to_string()))?;
        }

        Ok(Views { registry })
    }

    fn render<T: Serialize>(&self, name: &str, context: &T) -> Result<Html<String>> {
        self.registry
            .render(name, context)
            .map(Html)
            .map_err(|e| AppError::Render(e.to_string()))
    }

    pub fn login(&self, page: &LoginPage) -> Result<Html<String>> {
        self.render("login", page)
    }

    pub fn dashboard(&self, dashboard: &Dashboard) -> Result<Html<String>> {
        self.render("dashboard", &DashboardPage::from(dashboard))
    }

    pub fn new_project(&self, error: Option<&str>) -> Result<Html<String>> {
        self.render(
            "new_project",
            &serde_json::json!({ "title": "New Project", "error": error }),
        )
    }

    pub fn project(
        &self,
        detail: &ProjectDetail,
        open: &BTreeSet<String>,
        edit: Option<&str>,
    ) -> Result<Html<String>> {
        self.render("project", &ProjectPage::build(detail, open, edit))
    }
}

/// Format an amount the way the dashboard shows totals: thousands separators
/// and at most three fraction digits.
pub fn format_amount(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }

    let fixed = format!("{:.3}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let frac_part = frac_part.trim_end_matches('0');

    let mut grouped = String::new();
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let is_zero = int_part.chars().all(|c| c == '0') && frac_part.is_empty();
    let sign = if value < 0.0 && !is_zero { "-" } else { "" };
    if frac_part.is_empty() {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{}.{}", sign, grouped, frac_part)
    }
}

fn format_raw(amount: Option<f64>) -> String {
    amount.map(|a| a.to_string()).unwrap_or_default()
}

#[derive(Debug, Default, Serialize)]
pub struct LoginPage {
    pub title: &'static str,
    pub signup: bool,
    pub error: Option<String>,
    pub email: String,
    pub federated: bool,
}

impl LoginPage {
    pub fn new(signup: bool, federated: bool) -> Self {
        LoginPage {
            title: if signup { "Sign up" } else { "Sign in" },
            signup,
            federated,
            ..Default::default()
        }
    }

    pub fn with_error(mut self, email: &str, error: impl ToString) -> Self {
        self.email = email.to_string();
        self.error = Some(error.to_string());
        self
    }
}

#[derive(Serialize)]
struct DashboardPage {
    title: &'static str,
    groups: Vec<ProjectGroup>,
}

#[derive(Serialize)]
struct ProjectGroup {
    title: &'static str,
    projects: Vec<ProjectCard>,
}

#[derive(Serialize)]
struct ProjectCard {
    id: String,
    name: String,
    description: String,
    total: String,
}

impl ProjectCard {
    fn from_listed(listed: &ProjectWithTotal) -> Self {
        let project = &listed.project;
        ProjectCard {
            id: urlencoding::encode(&project.id).into_owned(),
            name: project.name.clone(),
            description: if project.description.is_empty() {
                "No description".to_string()
            } else {
                project.description.clone()
            },
            total: format_amount(listed.total_amount),
        }
    }
}

impl From<&Dashboard> for DashboardPage {
    fn from(dashboard: &Dashboard) -> Self {
        let groups = [
            ("My Projects", &dashboard.my_projects),
            ("My Expenses", &dashboard.my_expenses),
        ]
        .into_iter()
        // Empty groups are not shown at all
        .filter(|(_, projects)| !projects.is_empty())
        .map(|(title, projects)| ProjectGroup {
            title,
            projects: projects.iter().map(ProjectCard::from_listed).collect(),
        })
        .collect();

        DashboardPage {
            title: "Dashboard",
            groups,
        }
    }
}

#[derive(Serialize)]
struct ProjectPage {
    title: &'static str,
    project_id: String,
    open: String,
    meta: MetaView,
    sections: Vec<SectionView>,
}

#[derive(Serialize)]
struct MetaView {
    name: String,
    description: String,
}

#[derive(Serialize)]
struct SectionView {
    name: String,
    expanded: bool,
    open: String,
    rename_url: String,
    toggle_url: String,
    items_url: String,
    editing: String,
    form_name: String,
    form_amount: String,
    items: Vec<ItemView>,
}

#[derive(Serialize)]
struct ItemView {
    name: String,
    amount: String,
    open: String,
    edit_url: String,
    delete_url: String,
}

/// Join open section ids into the `open` query value.
pub fn join_open(open: &BTreeSet<String>) -> String {
    open.iter().cloned().collect::<Vec<_>>().join(",")
}

/// Parse the `open` query value into a set of section ids.
pub fn split_open(open: Option<&str>) -> BTreeSet<String> {
    open.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn project_url(project_id: &str, open: &BTreeSet<String>, edit: Option<&str>) -> String {
    let mut url = format!("/project/{}", urlencoding::encode(project_id));
    let mut params = Vec::new();
    if !open.is_empty() {
        params.push(format!("open={}", urlencoding::encode(&join_open(open))));
    }
    if let Some(edit) = edit {
        params.push(format!("edit={}", urlencoding::encode(edit)));
    }
    if !params.is_empty() {
        url.push('?');
        url.push_str(&params.join("&"));
    }
    url
}

impl ProjectPage {
    fn build(detail: &ProjectDetail, open: &BTreeSet<String>, edit: Option<&str>) -> Self {
        let pid = urlencoding::encode(&detail.id).into_owned();

        // The section holding the item being edited is always shown expanded
        let mut open = open.clone();
        if let Some(edit) = edit {
            if let Some(section) = detail
                .sections
                .iter()
                .find(|s| s.items.iter().any(|i| i.id == edit))
            {
                open.insert(section.id.clone());
            }
        }
        let open_param = join_open(&open);

        let sections = detail
            .sections
            .iter()
            .map(|section| {
                let mut state = SectionState::new();
                if open.contains(&section.id) {
                    state.toggle();
                }

                let mut form = ItemInput::default();
                if let Some(item) = edit.and_then(|e| section.items.iter().find(|i| i.id == e)) {
                    form = state.begin_edit(item);
                }

                let mut toggled = open.clone();
                if !toggled.remove(&section.id) {
                    toggled.insert(section.id.clone());
                }

                let sid = urlencoding::encode(&section.id).into_owned();
                SectionView {
                    name: section.name.clone(),
                    expanded: state.is_expanded(),
                    open: open_param.clone(),
                    rename_url: format!("/project/{}/sections/{}", pid, sid),
                    toggle_url: project_url(&detail.id, &toggled, None),
                    items_url: format!("/project/{}/sections/{}/items", pid, sid),
                    editing: state.editing_item_id().unwrap_or_default().to_string(),
                    form_name: form.name,
                    form_amount: format_raw(form.amount),
                    items: section
                        .items
                        .iter()
                        .map(|item| ItemView {
                            name: item.name.clone(),
                            amount: format_raw(item.amount),
                            open: open_param.clone(),
                            edit_url: project_url(&detail.id, &open, Some(&item.id)),
                            delete_url: format!(
                                "/project/{}/sections/{}/items/{}/delete",
                                pid,
                                sid,
                                urlencoding::encode(&item.id)
                            ),
                        })
                        .collect(),
                }
            })
            .collect();

        let meta = detail.meta.clone().unwrap_or_default();
        ProjectPage {
            title: "Project Details",
            project_id: pid,
            open: open_param,
            meta: MetaView {
                name: meta.name,
                description: meta.description,
            },
            sections,
        }
    }
}

/// Location to return to after a mutation on the project page.
pub fn project_location(project_id: &str, open: Option<&str>, edit: Option<&str>) -> String {
    project_url(project_id, &split_open(open), edit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_like_a_locale_total() {
        assert_eq!(format_amount(575.0), "575");
        assert_eq!(format_amount(1234.5), "1,234.5");
        assert_eq!(format_amount(1234567.891), "1,234,567.891");
        assert_eq!(format_amount(0.1 + 0.2), "0.3");
        assert_eq!(format_amount(-1500.0), "-1,500");
        assert_eq!(format_amount(-0.0001), "0");
    }

    #[test]
    fn open_param_round_trip() {
        let open = split_open(Some("b, a,,"));
        assert_eq!(join_open(&open), "a,b");
        assert_eq!(project_location("p1", Some("a"), Some("i9")), "/project/p1?open=a&edit=i9");
        assert_eq!(project_location("p1", None, None), "/project/p1");
    }

    #[test]
    fn add_section_form_carries_the_open_sections() {
        let detail = ProjectDetail {
            id: "p1".to_string(),
            meta: None,
            root: crate::paths::CollectionRoot::Projects,
            sections: Vec::new(),
        };
        let open = split_open(Some("s1,s2"));

        let html = Views::new().unwrap().project(&detail, &open, None).unwrap().0;
        assert!(html.contains(r#"action="/project/p1/sections""#));
        assert!(html.contains(r#"<input type="hidden" name="open" value="s1,s2">"#));
    }
}
