//! # Brief QA
//!
//! A library for reconciling a human-authored advertising campaign brief (a
//! spreadsheet grid with no fixed schema) against the live configuration of
//! an ad-serving platform's campaign/line-item/creative hierarchy, reporting
//! every configuration discrepancy before launch.
//!
//! ## Core Concepts
//!
//! - **Brief**: a loosely-structured grid; four logical sections (account,
//!   campaign, placement, target) are located heuristically and extracted
//!   best-effort.
//! - **Alternate ids**: BVI/BVT/BVP business keys embedded in both the brief
//!   and the platform's `alternative_id` fields, joining the two worlds.
//! - **MergedRow**: one (line item, creative) pair with its campaign,
//!   advertiser and resolved brief context; the unit every rule engine
//!   scores. Unresolved joins degrade to an explicit `"N/A"` sentinel.
//! - **Rule engines**: naming conventions (with per-entity `C`/`Li`/`Cr`
//!   attribution), targeting configuration, flight dates, and creative
//!   attributes. All pure; a failing row never halts the run.
//!
//! ## Example
//!
//! ```rust,ignore
//! use brief_qa::*;
//!
//! let grid = BriefGrid::from_strings(read_brief_cells()?);
//! let snapshot: PlatformSnapshot = serde_json::from_str(&feed)?;
//!
//! let report = run_qa(&grid, &snapshot)?;
//! for table in report.tables() {
//!     render(table);
//! }
//! ```

pub mod creative;
pub mod dates;
pub mod error;
pub mod extractor;
pub mod flights;
pub mod grid;
pub mod keys;
pub mod naming;
pub mod reconciler;
pub mod report;
pub mod schema;
pub mod targeting;

pub use creative::{evaluate_creatives, CreativeRowResult};
pub use dates::{normalize_date, normalize_date_str, parse_date, parse_date_str};
pub use error::{BriefQaError, Result};
pub use extractor::{extract_structured_brief, FieldValues, Section, StructuredBrief, TableSection};
pub use flights::{evaluate_flights, FlightRowResult};
pub use grid::{BriefGrid, CellValue};
pub use keys::{compare_lists, is_effectively_empty, normalize_key};
pub use naming::{NamingRowResult, NamingRuleEngine};
pub use reconciler::{build_merged_rows, BriefContext, MergedRow, NA};
pub use report::{CheckOutcome, ReportRow, ReportTable};
pub use schema::*;
pub use targeting::{TargetingRowResult, TargetingRuleEngine};

use log::{debug, info};

/// Everything one QA run produces: the merged table plus per-family results
/// and their renderable report tables.
#[derive(Debug, Clone)]
pub struct QaReport {
    pub brief: StructuredBrief,
    pub context: BriefContext,
    pub merged_rows: Vec<MergedRow>,
    pub naming: Vec<NamingRowResult>,
    pub targeting: Vec<TargetingRowResult>,
    pub flights: Vec<FlightRowResult>,
    pub creatives: Vec<CreativeRowResult>,
}

impl QaReport {
    /// The annotated tables, one per validation family, in workbook order.
    pub fn tables(&self) -> Vec<ReportTable> {
        vec![
            report::flight_report(&self.flights),
            report::naming_report(&self.merged_rows, &self.naming),
            report::targeting_report(&self.merged_rows, &self.targeting),
            report::creative_report(&self.creatives),
        ]
    }

    pub fn rows_with_issues(&self) -> usize {
        self.naming.iter().filter(|r| r.has_issues).count()
    }
}

/// Run the full pipeline: extract the brief, reconcile it against the
/// platform snapshot, then score every rule family.
///
/// Only two conditions are terminal: a brief yielding zero sections, and a
/// snapshot with no line items. Everything else degrades per-section or
/// per-row with an explicit sentinel.
pub fn run_qa(grid: &BriefGrid, snapshot: &PlatformSnapshot) -> Result<QaReport> {
    let brief = extract_structured_brief(grid)?;
    run_qa_extracted(brief, snapshot)
}

/// Run the pipeline over an already-extracted brief, for callers that keep
/// their own extraction or replay a stored one.
pub fn run_qa_extracted(brief: StructuredBrief, snapshot: &PlatformSnapshot) -> Result<QaReport> {
    info!(
        "Running QA: {} campaigns, {} line items, {} creatives against {} brief sections",
        snapshot.campaigns.len(),
        snapshot.line_items.len(),
        snapshot.creatives.len(),
        brief.section_count()
    );

    let context = BriefContext::from_brief(&brief);
    debug!(
        "Brief context: product={}, hub={}, lda={}, viewability={:?}",
        context.product_type, context.is_hub, context.is_lda_required, context.viewability_perc
    );

    let merged_rows = build_merged_rows(snapshot, &brief)?;

    let naming = NamingRuleEngine::new(&context).evaluate(&merged_rows);
    let targeting = TargetingRuleEngine::new(&context).evaluate(&merged_rows);
    let flights = evaluate_flights(&merged_rows, &brief, &context);
    let creatives = evaluate_creatives(&merged_rows);

    info!(
        "QA complete: {} merged rows, {} with naming issues",
        merged_rows.len(),
        naming.iter().filter(|r| r.has_issues).count()
    );

    Ok(QaReport {
        brief,
        context,
        merged_rows,
        naming,
        targeting,
        flights,
        creatives,
    })
}
