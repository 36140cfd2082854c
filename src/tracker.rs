use crate::draft::Draft;
use crate::error::Result;
use crate::model::{
    Dashboard, Item, ItemInput, NewProject, Project, ProjectDetail, ProjectMeta, ProjectWithTotal,
    Section, SectionData, ValidItem,
};
use crate::paths::{CollectionRoot, LEGACY_EXPENSES_PROJECT_ID, ProjectPaths};
use crate::section::{ItemAction, SectionState};
use crate::store::{DocumentStore, FieldValue, Fields};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// How a project's total is obtained.
#[async_trait]
pub trait TotalStrategy: Send + Sync {
    async fn total_under(
        &self,
        store: &dyn DocumentStore,
        root: CollectionRoot,
        project_id: &str,
    ) -> Result<f64>;
}

/// Fetch every section, then every section's items, and sum the amounts.
///
/// Work is proportional to sections × items and nothing is cached between
/// calls, so a total always reflects the latest persisted items.
#[derive(Clone, Copy, Debug, Default)]
pub struct FanOutTotals;

#[async_trait]
impl TotalStrategy for FanOutTotals {
    async fn total_under(
        &self,
        store: &dyn DocumentStore,
        root: CollectionRoot,
        project_id: &str,
    ) -> Result<f64> {
        let paths = ProjectPaths::in_root(root, project_id)?;
        let mut total = 0.0;

        for section in store.list(&paths.sections()?).await? {
            for doc in store.list(&paths.items(&section.id)?).await? {
                total += Item::from_document(&doc).contribution();
            }
        }

        Ok(total)
    }
}

/// Result of saving project metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// Draft equal to snapshot; no write issued
    Unchanged,
    /// Required name missing; no write issued
    Rejected,
}

/// Project, section and item operations over a [`DocumentStore`].
///
/// Cloning is cheap; clones share the same store.
#[derive(Clone)]
pub struct Tracker {
    store: Arc<dyn DocumentStore>,
    totals: Arc<dyn TotalStrategy>,
}

impl Tracker {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_totals(store, Arc::new(FanOutTotals))
    }

    pub fn with_totals(store: Arc<dyn DocumentStore>, totals: Arc<dyn TotalStrategy>) -> Self {
        Tracker { store, totals }
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Create the legacy expenses document if the store does not hold it yet.
    pub async fn seed_legacy_project(&self) -> Result<bool> {
        let paths = ProjectPaths::resolve(LEGACY_EXPENSES_PROJECT_ID)?;
        if self.store.get(paths.project()).await?.is_some() {
            return Ok(false);
        }

        let fields = Fields::from([
            ("name".to_string(), FieldValue::Text("My Expenses".to_string())),
            ("description".to_string(), FieldValue::Text(String::new())),
            ("createdAt".to_string(), FieldValue::ServerTimestamp),
        ]);
        self.store.set(paths.project(), fields).await?;
        log::info!("seeded legacy expenses project {}", paths.project());
        Ok(true)
    }

    /// Create a project in the `projects` root owned by `owner_id`.
    ///
    /// Returns `None` without writing when the name is empty.
    pub async fn create_project(&self, owner_id: &str, input: &NewProject) -> Result<Option<String>> {
        if input.name.trim().is_empty() {
            return Ok(None);
        }

        let id = self
            .store
            .create(&CollectionRoot::Projects.collection(), input.to_fields(owner_id))
            .await?;
        log::info!("project {} created by {}", id, owner_id);
        Ok(Some(id))
    }

    pub async fn list_projects(&self, root: CollectionRoot) -> Result<Vec<Project>> {
        let docs = self.store.list(&root.collection()).await?;
        Ok(docs.iter().map(Project::from_document).collect())
    }

    /// Both project collections, each project with a freshly computed total.
    pub async fn dashboard(&self) -> Result<Dashboard> {
        let my_projects = self.list_projects(CollectionRoot::Projects).await?;
        let my_expenses = self.list_projects(CollectionRoot::Expenses).await?;

        Ok(Dashboard {
            my_projects: self.with_totals_in(CollectionRoot::Projects, my_projects).await?,
            my_expenses: self.with_totals_in(CollectionRoot::Expenses, my_expenses).await?,
        })
    }

    async fn with_totals_in(
        &self,
        root: CollectionRoot,
        projects: Vec<Project>,
    ) -> Result<Vec<ProjectWithTotal>> {
        let mut results = Vec::with_capacity(projects.len());
        for project in projects {
            let total_amount = self
                .totals
                .total_under(self.store.as_ref(), root, &project.id)
                .await?;
            results.push(ProjectWithTotal {
                project,
                root,
                total_amount,
            });
        }
        Ok(results)
    }

    /// Total of every item under `project_id`, recomputed on each call.
    pub async fn compute_total(&self, project_id: &str) -> Result<f64> {
        let root = ProjectPaths::resolve(project_id)?.root();
        self.totals
            .total_under(self.store.as_ref(), root, project_id)
            .await
    }

    /// Read project metadata from both roots; the `expenses` copy wins.
    pub async fn load_meta(&self, project_id: &str) -> Result<Option<ProjectMeta>> {
        let in_projects = ProjectPaths::in_root(CollectionRoot::Projects, project_id)?;
        let in_expenses = ProjectPaths::in_root(CollectionRoot::Expenses, project_id)?;

        let mut meta = None;
        if let Some(doc) = self.store.get(in_projects.project()).await? {
            meta = Some(ProjectMeta::from_document(&doc));
        }
        if let Some(doc) = self.store.get(in_expenses.project()).await? {
            meta = Some(ProjectMeta::from_document(&doc));
        }
        Ok(meta)
    }

    pub async fn load_sections(&self, project_id: &str) -> Result<Vec<SectionData>> {
        let paths = ProjectPaths::resolve(project_id)?;
        let mut sections = Vec::new();

        for doc in self.store.list(&paths.sections()?).await? {
            let section = Section::from_document(&doc);
            let items = self
                .store
                .list(&paths.items(&section.id)?)
                .await?
                .iter()
                .map(Item::from_document)
                .collect();

            sections.push(SectionData {
                id: section.id,
                name: section.name,
                items,
            });
        }

        Ok(sections)
    }

    pub async fn load_project(&self, project_id: &str) -> Result<ProjectDetail> {
        let root = ProjectPaths::resolve(project_id)?.root();
        let meta = self.load_meta(project_id).await?;
        let sections = self.load_sections(project_id).await?;

        Ok(ProjectDetail {
            id: project_id.to_string(),
            meta,
            root,
            sections,
        })
    }

    /// Persist edited metadata if the draft differs from its snapshot, then
    /// re-read the project and commit what was stored.
    pub async fn save_meta(
        &self,
        project_id: &str,
        draft: &mut Draft<ProjectMeta>,
    ) -> Result<SaveOutcome> {
        if !draft.is_modified() {
            return Ok(SaveOutcome::Unchanged);
        }
        if draft.draft().name.trim().is_empty() {
            return Ok(SaveOutcome::Rejected);
        }

        let paths = ProjectPaths::resolve(project_id)?;
        let fields = Fields::from([
            ("name".to_string(), FieldValue::Text(draft.draft().name.clone())),
            (
                "description".to_string(),
                FieldValue::Text(draft.draft().description.clone()),
            ),
        ]);
        self.store.update(paths.project(), fields).await?;

        if let Some(persisted) = self.load_meta(project_id).await? {
            draft.commit(persisted);
        }
        Ok(SaveOutcome::Saved)
    }

    /// Returns the new section id, or `None` without writing for an empty name.
    pub async fn add_section(&self, project_id: &str, name: &str) -> Result<Option<String>> {
        if name.trim().is_empty() {
            return Ok(None);
        }

        let paths = ProjectPaths::resolve(project_id)?;
        let fields = Fields::from([
            ("name".to_string(), FieldValue::Text(name.to_string())),
            ("createdAt".to_string(), FieldValue::ServerTimestamp),
        ]);
        let id = self.store.create(&paths.sections()?, fields).await?;
        Ok(Some(id))
    }

    pub async fn rename_section(&self, project_id: &str, section_id: &str, name: &str) -> Result<bool> {
        if name.trim().is_empty() {
            return Ok(false);
        }

        let paths = ProjectPaths::resolve(project_id)?;
        let fields = Fields::from([("name".to_string(), FieldValue::Text(name.to_string()))]);
        self.store.update(&paths.section(section_id)?, fields).await?;
        Ok(true)
    }

    /// Create an item; `None` without writing if the guard rejects the input.
    pub async fn add_item(
        &self,
        project_id: &str,
        section_id: &str,
        input: &ItemInput,
    ) -> Result<Option<String>> {
        match input.validate() {
            Some(item) => self.create_item(project_id, section_id, &item).await.map(Some),
            None => Ok(None),
        }
    }

    /// Update an item in place; `false` without writing if the guard rejects.
    pub async fn update_item(
        &self,
        project_id: &str,
        section_id: &str,
        item_id: &str,
        input: &ItemInput,
    ) -> Result<bool> {
        match input.validate() {
            Some(item) => {
                self.write_item(project_id, section_id, item_id, &item).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Submit the shared item form of one section: update the item selected
    /// for editing, or create a new one.
    pub async fn submit_item(
        &self,
        project_id: &str,
        section_id: &str,
        state: &mut SectionState,
        input: &ItemInput,
    ) -> Result<ItemAction> {
        let action = state.plan_submit(input);
        match &action {
            ItemAction::Rejected => {
                log::debug!("item form in section {} rejected", section_id);
            }
            ItemAction::Create(item) => {
                self.create_item(project_id, section_id, item).await?;
            }
            ItemAction::Update { item_id, item } => {
                self.write_item(project_id, section_id, item_id, item).await?;
            }
        }
        state.finish_submit(&action);
        Ok(action)
    }

    async fn create_item(&self, project_id: &str, section_id: &str, item: &ValidItem) -> Result<String> {
        let paths = ProjectPaths::resolve(project_id)?;
        let fields = Fields::from([
            ("name".to_string(), FieldValue::Text(item.name.clone())),
            ("amount".to_string(), FieldValue::Number(item.amount)),
            ("createdAt".to_string(), FieldValue::Timestamp(Utc::now())),
        ]);
        let id = self.store.create(&paths.items(section_id)?, fields).await?;
        Ok(id)
    }

    async fn write_item(
        &self,
        project_id: &str,
        section_id: &str,
        item_id: &str,
        item: &ValidItem,
    ) -> Result<()> {
        let paths = ProjectPaths::resolve(project_id)?;
        let fields = Fields::from([
            ("name".to_string(), FieldValue::Text(item.name.clone())),
            ("amount".to_string(), FieldValue::Number(item.amount)),
            ("updatedAt".to_string(), FieldValue::Timestamp(Utc::now())),
        ]);
        self.store.update(&paths.item(section_id, item_id)?, fields).await?;
        Ok(())
    }

    pub async fn delete_item(&self, project_id: &str, section_id: &str, item_id: &str) -> Result<()> {
        let paths = ProjectPaths::resolve(project_id)?;
        self.store.delete(&paths.item(section_id, item_id)?).await?;
        Ok(())
    }
}
