//! One module per warehouse load. Every loader reads its inputs, resolves
//! keys, writes change/quarantine reports and hands batches to the sink.

pub mod audits;
pub mod calendar;
pub mod catalogs;
pub mod compare;
pub mod curated;
pub mod customers;
pub mod inventory;
pub mod products;
pub mod sales;
pub mod sellers;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, warn};

use crate::config::EtlConfig;
use crate::diff::{ChangeReport, ChangeStatus};
use crate::enrich::Enrichment;
use crate::error::{EtlError, Result};
use crate::manual::ManualFiles;
use crate::reports::ReportWriter;
use crate::resolver::{IntervalIssue, TemporalResolver};
use crate::sink::{SinkFailure, SinkOutcome, Warehouse};
use crate::source::{DateRange, Extraction, RecordSource};
use crate::types::Record;

/// Collaborators shared by every loader of a run.
pub struct LoaderContext<'a> {
    pub config: &'a EtlConfig,
    pub source: &'a dyn RecordSource,
    pub warehouse: &'a dyn Warehouse,
    pub manual: ManualFiles,
    pub reports: ReportWriter,
    /// Business date of the run in the configured timezone.
    pub today: NaiveDate,
    /// Overrides the default date span of the sales and calendar loaders.
    pub window: Option<DateRange>,
}

impl<'a> LoaderContext<'a> {
    pub fn new(
        config: &'a EtlConfig,
        source: &'a dyn RecordSource,
        warehouse: &'a dyn Warehouse,
    ) -> Self {
        Self {
            config,
            source,
            warehouse,
            manual: ManualFiles::new(&config.input_dir),
            reports: ReportWriter::new(&config.reports_dir, config.report_stamp()),
            today: config.today(),
            window: None,
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn with_window(mut self, window: DateRange) -> Self {
        self.window = Some(window);
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.config.batch_size
    }

    /// Write a report unless `rows` is empty.
    pub fn report<S: AsRef<str>>(
        &self,
        report: &mut LoaderReport,
        stem: &str,
        header: &[S],
        rows: &[Record],
    ) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let path = self.reports.write(stem, header, rows)?;
        report.reports.push(path);
        Ok(())
    }

    pub fn report_changes(
        &self,
        report: &mut LoaderReport,
        stem: &str,
        changes: &ChangeReport,
    ) -> Result<()> {
        report.record_changes(changes);
        self.report(report, stem, &changes.header(), &changes.to_rows())
    }

    pub fn report_quarantine(
        &self,
        report: &mut LoaderReport,
        stem: &str,
        enrichment: &Enrichment,
    ) -> Result<()> {
        report.quarantined += enrichment.quarantined.len();
        for (slot, count) in &enrichment.tally {
            *report.quarantine_tally.entry(*slot).or_default() += count;
        }
        if enrichment.quarantined.is_empty() {
            return Ok(());
        }
        let path = self
            .reports
            .write_records(stem, &enrichment.quarantine_rows())?;
        report.reports.push(path);
        Ok(())
    }

    pub fn report_interval_issues(
        &self,
        report: &mut LoaderReport,
        stem: &str,
        resolver: &TemporalResolver,
    ) -> Result<()> {
        for issue in resolver.issues() {
            report.notes.push(issue.to_string());
        }
        self.report(
            report,
            stem,
            &IntervalIssue::REPORT_HEADER,
            &resolver.issue_rows(),
        )
    }
}

/// What a loader did, for the run summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoaderReport {
    pub loader: &'static str,
    pub extracted: usize,
    pub new: usize,
    pub modified: usize,
    pub removed: usize,
    pub sink: SinkOutcome,
    pub quarantined: usize,
    /// Failed resolutions per foreign-key slot.
    pub quarantine_tally: BTreeMap<&'static str, usize>,
    /// Work-list rows written by an audit.
    pub pending: usize,
    pub skipped_tenants: Vec<String>,
    pub reports: Vec<PathBuf>,
    /// Data-quality findings that did not stop the load.
    pub notes: Vec<String>,
}

impl LoaderReport {
    pub fn new(loader: &'static str) -> Self {
        Self {
            loader,
            ..Self::default()
        }
    }

    pub fn record_changes(&mut self, changes: &ChangeReport) {
        self.new += changes.count(ChangeStatus::New);
        self.modified += changes.count(ChangeStatus::Modified);
        self.removed += changes.count(ChangeStatus::Removed);
        if changes.duplicate_keys > 0 {
            self.note(format!(
                "{} input rows repeated a natural key",
                changes.duplicate_keys
            ));
        }
    }

    pub fn record_extraction(&mut self, extraction: &Extraction<'_>) {
        self.extracted += extraction.item_count();
        self.skipped_tenants.extend(extraction.skipped_tenants());
    }

    /// Tenants whose stored dimension rows take part in the diff. A tenant
    /// that answered without items keeps its rows and gets a note.
    pub fn compared_tenants(
        &mut self,
        extraction: &Extraction<'_>,
        entity: &str,
    ) -> HashSet<String> {
        let mut compared = HashSet::new();
        for extracted in &extraction.tenants {
            let tenant = extracted.tenant.name.as_str();
            if extracted.items.is_empty() {
                self.note(format!(
                    "{tenant}: no {entity} returned; stored {entity} left unchanged"
                ));
            } else {
                compared.insert(tenant.to_string());
            }
        }
        compared
    }

    /// The report itself, or a partial-load error carrying it when any
    /// tenant batch was rolled back.
    pub fn finish(self, failures: Vec<SinkFailure>) -> Result<LoaderReport> {
        if failures.is_empty() {
            return Ok(self);
        }
        Err(EtlError::PartialLoad {
            failures,
            report: Box::new(self),
        })
    }

    /// Record a tenant whose sink batch was rolled back.
    pub fn tenant_failed(&mut self, tenant: &str, failure: &SinkFailure) {
        error!(
            loader = self.loader,
            tenant,
            error = %failure,
            "Batch failed; continuing with the next tenant"
        );
        self.skipped_tenants.push(tenant.to_string());
    }

    pub fn note(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(loader = self.loader, note = %message, "Data-quality note");
        self.notes.push(message);
    }
}

/// Every loader runnable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Loader {
    Products,
    Customers,
    Sellers,
    Inventory,
    Sales,
    ProductManagement,
    CustomerMaster,
    CustomerClassification,
    People,
    Roles,
    ProductsPending,
    CustomersPending,
    SellersAudit,
    Catalogs,
    Calendar,
    InventorySnapshot,
}

impl Loader {
    pub const ALL: [Loader; 16] = [
        Loader::Products,
        Loader::Customers,
        Loader::Sellers,
        Loader::Inventory,
        Loader::Sales,
        Loader::ProductManagement,
        Loader::CustomerMaster,
        Loader::CustomerClassification,
        Loader::People,
        Loader::Roles,
        Loader::ProductsPending,
        Loader::CustomersPending,
        Loader::SellersAudit,
        Loader::Catalogs,
        Loader::Calendar,
        Loader::InventorySnapshot,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Loader::Products => "products",
            Loader::Customers => "customers",
            Loader::Sellers => "sellers",
            Loader::Inventory => "inventory",
            Loader::Sales => "sales",
            Loader::ProductManagement => "product_management",
            Loader::CustomerMaster => "customer_master",
            Loader::CustomerClassification => "customer_classification",
            Loader::People => "people",
            Loader::Roles => "roles",
            Loader::ProductsPending => "products_pending",
            Loader::CustomersPending => "customers_pending",
            Loader::SellersAudit => "sellers_audit",
            Loader::Catalogs => "catalogs",
            Loader::Calendar => "calendar",
            Loader::InventorySnapshot => "inventory_snapshot",
        }
    }

    pub async fn run(&self, ctx: &LoaderContext<'_>) -> Result<LoaderReport> {
        match self {
            Loader::Products => products::load(ctx).await,
            Loader::Customers => customers::load(ctx).await,
            Loader::Sellers => sellers::load(ctx).await,
            Loader::Inventory => inventory::load(ctx).await,
            Loader::Sales => sales::load(ctx, ctx.window).await,
            Loader::ProductManagement => curated::load_product_management(ctx).await,
            Loader::CustomerMaster => curated::load_customer_master(ctx).await,
            Loader::CustomerClassification => curated::load_customer_classification(ctx).await,
            Loader::People => curated::load_people(ctx).await,
            Loader::Roles => curated::load_roles(ctx).await,
            Loader::ProductsPending => audits::products_pending(ctx).await,
            Loader::CustomersPending => audits::customers_pending(ctx).await,
            Loader::SellersAudit => audits::sellers_audit(ctx).await,
            Loader::Catalogs => catalogs::load(ctx).await,
            Loader::Calendar => {
                let range = match ctx.window {
                    Some(range) => range,
                    None => calendar::default_range()?,
                };
                calendar::load(ctx, range).await
            }
            Loader::InventorySnapshot => inventory::snapshot(ctx).await,
        }
    }
}

impl fmt::Display for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Loader {
    type Err = EtlError;

    fn from_str(value: &str) -> Result<Self> {
        let wanted = value.trim().replace('-', "_");
        Loader::ALL
            .into_iter()
            .find(|loader| loader.name() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Loader::ALL.iter().map(Loader::name).collect();
                EtlError::Configuration(format!(
                    "unknown loader {value:?}; expected one of {}",
                    known.join(", ")
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loader_names_round_trip_and_accept_dashes() {
        for loader in Loader::ALL {
            assert_eq!(loader.name().parse::<Loader>().unwrap(), loader);
        }
        assert_eq!("product-management".parse::<Loader>().unwrap(), Loader::ProductManagement);
        assert!("payroll".parse::<Loader>().is_err());
    }
}
