//! Running scheduled templates end to end.
//!
//! A [`Synchronizer`] picks up every template in the template box whose
//! status is `scheduled`, then for each one loads its sheet and settings,
//! reconciles the sheet's order keys with the destination database, archives
//! stale pages and rebuilds the rest. Failures are isolated: a broken row
//! never stops its template, and a broken template never stops the run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{Result, SyncError};
use crate::filter::{create_remote_filter, filter_rows};
use crate::ids::extract_database_id;
use crate::models::{Cover, Icon, OrderKey, Row};
use crate::preprocess::apply_plan;
use crate::properties::{PropertyBinding, build_properties};
use crate::reconcile::{DestinationIndex, OrderKeySet, archive_stale, reconcile};
use crate::store::{
    DatabaseQuery, DocumentStore, DocumentSummary, NewPage, RowSource, Sort, TextRewriteOracle,
    fetch_all,
};
use crate::template::settings::{
    block_var_bindings, filter_clauses, pre_process_plan, property_bindings,
};
use crate::template::{BlockVarTable, CoverIconColumns, TemplateLayout, TemplateTree, split_page};

/// Status option names written to templates and destination pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusLabels {
    pub scheduled: String,
    pub waiting: String,
    pub running: String,
    pub done: String,
    pub error: String,
    /// Set on every page created for a row.
    pub row_done: String,
    /// Set on the existing page of a row that could not be rebuilt.
    pub row_error: String,
}

impl Default for StatusLabels {
    fn default() -> Self {
        Self {
            scheduled: "Scheduled".to_string(),
            waiting: "Waiting".to_string(),
            running: "Running".to_string(),
            done: "Done".to_string(),
            error: "Error".to_string(),
            row_done: "Synced".to_string(),
            row_error: "Sync error".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Database holding the templates.
    pub template_box_database: String,
    /// Number property of destination pages holding the order key.
    pub order_property: String,
    /// Sheet column holding the order key.
    pub order_column: String,
    /// Status property, on templates and (when present) destination pages.
    pub status_property: String,
    pub status: StatusLabels,
    pub layout: TemplateLayout,
    pub rewrite_batch_size: usize,
    /// Skip every order key up to and including this one.
    pub resume_from: Option<OrderKey>,
    /// Template property mentioning the destination database.
    pub output_database_property: String,
    /// Template property holding the sheet file.
    pub sheet_property: String,
    /// Template property whose value `全体`/`all` rewrites every text column.
    pub pre_process_scope_property: String,
}

impl SyncOptions {
    pub fn new(template_box_database: impl Into<String>) -> Self {
        Self {
            template_box_database: template_box_database.into(),
            order_property: "order".to_string(),
            order_column: "order".to_string(),
            status_property: "Status".to_string(),
            status: StatusLabels::default(),
            layout: TemplateLayout::default(),
            rewrite_batch_size: 20,
            resume_from: None,
            output_database_property: "Database Mention".to_string(),
            sheet_property: "csv file".to_string(),
            pre_process_scope_property: "Pre Process".to_string(),
        }
    }
}

/// How a template run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateOutcome {
    /// Every stage ran. Individual rows may still have failed.
    Done,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub template_id: String,
    pub outcome: TemplateOutcome,
    pub created: OrderKeySet,
    pub archived: OrderKeySet,
    pub failed_orders: OrderKeySet,
}

impl SyncReport {
    fn failed(template_id: &str, error: &SyncError) -> Self {
        Self {
            template_id: template_id.to_string(),
            outcome: TemplateOutcome::Error(error.to_string()),
            created: OrderKeySet::new(),
            archived: OrderKeySet::new(),
            failed_orders: OrderKeySet::new(),
        }
    }
}

/// Everything loaded once per template and shared by its rows.
struct TemplatePlan<'t> {
    output_database: String,
    tree: TemplateTree,
    block_vars: BlockVarTable,
    properties: Vec<PropertyBinding>,
    cover_icon: CoverIconColumns,
    default_cover: Option<&'t Cover>,
    default_icon: Option<&'t Icon>,
    index: DestinationIndex,
    /// Whether destination pages carry the status property.
    tracks_status: bool,
}

pub struct Synchronizer<'a> {
    store: &'a dyn DocumentStore,
    rows: &'a dyn RowSource,
    oracle: Option<&'a dyn TextRewriteOracle>,
    options: SyncOptions,
}

impl<'a> Synchronizer<'a> {
    pub fn new(store: &'a dyn DocumentStore, rows: &'a dyn RowSource, options: SyncOptions) -> Self {
        Self {
            store,
            rows,
            oracle: None,
            options,
        }
    }

    pub fn with_oracle(mut self, oracle: &'a dyn TextRewriteOracle) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Runs every scheduled template, in the order the template box returns
    /// them. Only a failure to query the template box is returned as an error.
    pub fn run(&self) -> Result<Vec<SyncReport>> {
        let query = DatabaseQuery {
            filter: Some(json!({
                "property": self.options.status_property,
                "status": { "equals": self.options.status.scheduled },
            })),
            sorts: Vec::new(),
        };
        let templates = fetch_all(self.store, &self.options.template_box_database, &query)?;
        log::info!("Found {} scheduled templates", templates.len());

        for template in &templates {
            self.mark_template(&template.id, &self.options.status.waiting);
        }

        let mut reports = Vec::with_capacity(templates.len());
        for template in &templates {
            log::info!("Running template {}", template.id);
            self.mark_template(&template.id, &self.options.status.running);
            let report = match self.sync_template(template) {
                Ok(report) => {
                    log::info!(
                        "Template {} done: {} created, {} archived, {} failed",
                        template.id,
                        report.created.len(),
                        report.archived.len(),
                        report.failed_orders.len()
                    );
                    self.mark_template(&template.id, &self.options.status.done);
                    report
                }
                Err(e) => {
                    log::error!("Template {} failed: {e}", template.id);
                    self.mark_template(&template.id, &self.options.status.error);
                    SyncReport::failed(&template.id, &e)
                }
            };
            reports.push(report);
        }
        Ok(reports)
    }

    /// Runs one template regardless of its status.
    pub fn sync_template(&self, template: &DocumentSummary) -> Result<SyncReport> {
        let output_database = self.output_database(template)?;
        let location = self.sheet_location(template)?;
        let mut sheet = self.rows.load(&location)?;
        log::debug!("Loaded {} rows from {location}", sheet.len());

        let sections = split_page(self.store.get_block_children(&template.id)?, &self.options.layout)?;
        let settings = &sections.settings;
        let schema = self.store.get_database_schema(&output_database)?;

        let pre_process = pre_process_plan(
            template,
            &self.options.pre_process_scope_property,
            &self.settings_rows(settings.pre_process.as_deref(), None)?,
        )?;
        apply_plan(&mut sheet, &pre_process, self.oracle, self.options.rewrite_batch_size)?;

        let cover_icon =
            CoverIconColumns::from_rows(&self.settings_rows(settings.cover_icon.as_deref(), None)?)?;
        let block_var_rows =
            self.settings_rows(settings.block_vars.as_deref(), Some("Block number"))?;
        let block_vars = BlockVarTable::new(block_var_bindings(&block_var_rows)?, &sheet)?;
        let tree = TemplateTree::load(self.store, &sections.template_blocks)?;
        tree.check_bindings(&block_vars)?;

        let properties = property_bindings(
            &self.settings_rows(settings.property_columns.as_deref(), None)?,
            &schema,
            &sheet,
        )?;
        let clauses = filter_clauses(
            &self.settings_rows(settings.filters.as_deref(), None)?,
            &schema,
            &sheet,
        )?;

        let source_count = sheet.len();
        let rows = filter_rows(sheet.rows, &clauses)?;
        let remote = create_remote_filter(&clauses)?;

        let sorted = DatabaseQuery {
            filter: None,
            sorts: vec![Sort::ascending(&self.options.order_property)],
        };
        let all_documents = fetch_all(self.store, &output_database, &sorted)?;
        let destination_count = all_documents.len();
        let documents = match remote {
            Some(filter) => fetch_all(
                self.store,
                &output_database,
                &DatabaseQuery {
                    filter: Some(filter),
                    ..sorted
                },
            )?,
            None => all_documents,
        };
        let index = DestinationIndex::from_documents(&documents, &self.options.order_property);

        let mut by_key: BTreeMap<OrderKey, &Row> = BTreeMap::new();
        for row in &rows {
            match row.order_key(&self.options.order_column) {
                Some(key) => {
                    by_key.entry(key).or_insert(row);
                }
                None => log::warn!("Skipping row without a valid {}", self.options.order_column),
            }
        }
        let source_keys: OrderKeySet = by_key.keys().copied().collect();

        let mut sets = reconcile(&source_keys, &index.keys(), source_count, destination_count);
        if let Some(resume_from) = self.options.resume_from {
            log::info!("Resuming after order {resume_from}");
            sets = sets.resume_after(resume_from);
        }

        let stale: OrderKeySet = sets.stale().filter(|k| index.get(*k).is_some()).collect();
        let mut failed_orders = archive_stale(self.store, &index, stale.iter().copied());
        let archived: OrderKeySet = stale.difference(&failed_orders).copied().collect();

        let plan = TemplatePlan {
            output_database,
            tree,
            block_vars,
            properties,
            cover_icon,
            default_cover: template.cover.as_ref(),
            default_icon: template.icon.as_ref(),
            index,
            tracks_status: schema.get(&self.options.status_property).is_some(),
        };

        let mut created = OrderKeySet::new();
        for key in &sets.common {
            let Some(row) = by_key.get(key) else {
                continue;
            };
            match self.sync_row(&plan, *key, row) {
                Ok(page_id) => {
                    log::info!("Created order {key} ({page_id})");
                    created.insert(*key);
                }
                Err(e) => {
                    log::warn!("Order {key} failed: {e}");
                    failed_orders.insert(*key);
                    self.recover_row(&plan, *key);
                }
            }
        }

        Ok(SyncReport {
            template_id: template.id.clone(),
            outcome: TemplateOutcome::Done,
            created,
            archived,
            failed_orders,
        })
    }

    /// Builds the page for one row, replaces the existing page for its key
    /// and stamps the key onto the new page.
    fn sync_row(&self, plan: &TemplatePlan<'_>, key: OrderKey, row: &Row) -> Result<String> {
        let mut properties = build_properties(&plan.properties, row)?;
        if plan.tracks_status && !properties.contains_key(&self.options.status_property) {
            properties.insert(
                self.options.status_property.clone(),
                status_value(&self.options.status.row_done),
            );
        }
        let children = plan.tree.render(row, &plan.block_vars)?;
        let (cover, icon) = plan
            .cover_icon
            .resolve(row, plan.default_cover, plan.default_icon);

        if let Some(existing) = plan.index.get(key) {
            self.store.archive_page(existing)?;
            log::debug!("Archived order {key} ({existing}) before rebuilding");
        }

        let page = NewPage {
            parent_database: plan.output_database.clone(),
            icon,
            cover,
            properties,
            children,
        };
        let page_id = self
            .store
            .create_page(&page)
            .map_err(|source| SyncError::PageCreation { order: key, source })?;

        if let Err(source) =
            self.store
                .set_page_property(&page_id, &self.options.order_property, json!({ "number": key }))
        {
            if let Err(e) = self.store.archive_page(&page_id) {
                log::warn!("Could not archive unordered page {page_id}: {e}");
            }
            return Err(SyncError::OrderIndexUpdate {
                order: key,
                page_id,
                source,
            });
        }
        Ok(page_id)
    }

    /// Restores the existing page of a failed row and flags it.
    fn recover_row(&self, plan: &TemplatePlan<'_>, key: OrderKey) {
        let Some(existing) = plan.index.get(key) else {
            return;
        };
        if let Err(e) = self.store.restore_page(existing) {
            log::error!("Could not restore order {key} ({existing}): {e}");
            return;
        }
        if plan.tracks_status
            && let Err(e) = self.store.set_page_property(
                existing,
                &self.options.status_property,
                status_value(&self.options.status.row_error),
            )
        {
            log::warn!("Could not flag order {key} ({existing}): {e}");
        }
    }

    fn mark_template(&self, template_id: &str, label: &str) {
        if let Err(e) = self.store.set_page_property(
            template_id,
            &self.options.status_property,
            status_value(label),
        ) {
            log::warn!("Could not set template {template_id} to {label}: {e}");
        }
    }

    fn settings_rows(&self, database: Option<&str>, sort_by: Option<&str>) -> Result<Vec<DocumentSummary>> {
        let Some(database) = database else {
            return Ok(Vec::new());
        };
        let query = DatabaseQuery {
            filter: None,
            sorts: sort_by.map(Sort::ascending).into_iter().collect(),
        };
        fetch_all(self.store, database, &query)
    }

    fn output_database(&self, template: &DocumentSummary) -> Result<String> {
        let property = &self.options.output_database_property;
        template
            .property(property)
            .and_then(|p| p.pointer("/rich_text/0/href"))
            .and_then(Value::as_str)
            .and_then(extract_database_id)
            .ok_or_else(|| {
                SyncError::malformed("template", format!("{property:?} does not mention a database"))
            })
    }

    fn sheet_location(&self, template: &DocumentSummary) -> Result<String> {
        let property = &self.options.sheet_property;
        let file = template
            .property(property)
            .and_then(|p| p.pointer("/files/0"));
        file.and_then(|f| f.pointer("/file/url").or_else(|| f.pointer("/external/url")))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| SyncError::malformed("template", format!("{property:?} holds no file")))
    }
}

fn status_value(label: &str) -> Value {
    json!({ "status": { "name": label } })
}
