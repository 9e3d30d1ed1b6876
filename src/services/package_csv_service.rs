//! Import and export of Super Offer package sheets.
//!
//! A sheet is a loose CSV: a metadata block (`Package:`, `Destination:`,
//! `Resort:`, `Currency:`), a pricing table whose header names every
//! `<min>-<max> People` x `<n> Nights` column, and optional `Inclusions:`,
//! `Accommodation:` and `Sales Notes:` bullet sections.
//!
//! Parsing never stops at the first problem. Every finding is returned as a
//! [`Diagnostic`] carrying the CSV line (and column where it applies) so the
//! admin UI can point at the offending cell.

use std::collections::HashSet;
use std::fmt;
use std::io;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::models::package::{
    GroupSizeTier, Inclusion, PackageDraft, PriceCell, PricingPeriod, PricingRow,
};
use crate::models::price::{Currency, Price, ON_REQUEST};
use crate::services::package_service::sanitize_sales_notes;

const METADATA_LINES: usize = 10;
const DEFAULT_CATEGORY: &str = "General";

static TIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*[-–]\s*(\d+)\s*(?:people|pax)\b").unwrap());
static NIGHTS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*nights?\b").unwrap());
static ON_REQUEST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^on[\s_-]*request$").unwrap());
static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{4}").unwrap());
static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(inclusions|accommodation|hotels|sales\s+notes|notes)\s*:\s*(.*)$").unwrap()
});
static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-•*]\s*(.*)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    MalformedLine,
    MissingMetadata,
    MissingHeader,
    ColumnFormat,
    InvalidHeader,
    OverlappingTiers,
    RowLength,
    InvalidPeriod,
    DuplicatePeriod,
    InvalidPrice,
    EmptyPricingTable,
    UnrecognizedBullet,
    UnexpectedContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// 1-based CSV line
    pub line: Option<usize>,
    /// 1-based CSV column
    pub column: Option<usize>,
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    fn error(kind: DiagnosticKind, line: Option<usize>, message: String) -> Self {
        Self {
            line,
            column: None,
            severity: Severity::Error,
            kind,
            message,
        }
    }

    fn warning(kind: DiagnosticKind, line: Option<usize>, message: String) -> Self {
        Self {
            line,
            column: None,
            severity: Severity::Warning,
            kind,
            message,
        }
    }

    fn at_column(mut self, column: usize) -> Self {
        self.column = Some(column);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => {
                write!(f, "line {}, column {}: {}", line, column, self.message)
            }
            (Some(line), None) => write!(f, "line {}: {}", line, self.message),
            _ => f.write_str(&self.message),
        }
    }
}

/// A sheet that can be imported. Warnings are cosmetic.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedPackage {
    pub draft: PackageDraft,
    pub warnings: Vec<Diagnostic>,
}

/// A sheet that was refused; carries every error and warning found.
#[derive(Debug, Clone, Serialize, Error)]
#[error("package sheet has {} error(s)", self.errors().count())]
pub struct ParseFailure {
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseFailure {
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}

struct Line {
    number: usize,
    cells: Vec<String>,
}

impl Line {
    fn is_blank(&self) -> bool {
        self.cells.iter().all(|cell| cell.is_empty())
    }

    fn first(&self) -> &str {
        self.cells.first().map(String::as_str).unwrap_or("")
    }

    /// Non-empty cells joined back together; commas inside unquoted bullet
    /// text end up split across cells.
    fn text(&self) -> String {
        self.cells
            .iter()
            .filter(|cell| !cell.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Inclusions,
    Accommodation,
    Notes,
}

fn section_header(line: &Line) -> Option<(Section, String)> {
    let caps = SECTION_RE.captures(line.first())?;
    let section = match caps[1].to_lowercase().split_whitespace().collect::<Vec<_>>()[..] {
        ["inclusions"] => Section::Inclusions,
        ["accommodation"] | ["hotels"] => Section::Accommodation,
        _ => Section::Notes,
    };
    let mut rest = vec![caps[2].trim().to_string()];
    rest.extend(line.cells.iter().skip(1).filter(|c| !c.is_empty()).cloned());
    let rest = rest
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    Some((section, rest))
}

/// One CSV record per physical line so diagnostics line up with what the
/// admin sees in a spreadsheet.
fn read_lines(text: &str, diagnostics: &mut Vec<Diagnostic>) -> Vec<Line> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let number = idx + 1;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(raw.as_bytes());

        let cells = match reader.records().next() {
            None => Vec::new(),
            Some(Ok(record)) => record
                .iter()
                .map(|cell| cell.replace('\u{00A0}', " ").trim().to_string())
                .collect(),
            Some(Err(e)) => {
                diagnostics.push(Diagnostic::error(
                    DiagnosticKind::MalformedLine,
                    Some(number),
                    format!("could not read line: {}", e),
                ));
                Vec::new()
            }
        };

        lines.push(Line { number, cells });
    }

    lines
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetadataKey {
    Name,
    Destination,
    Resort,
    Currency,
}

fn metadata_entry(line: &Line) -> Option<(MetadataKey, String)> {
    let first = line.cells.first()?;
    let (key, inline) = match first.split_once(':') {
        Some((key, value)) => (key.trim(), value.trim()),
        None => (first.trim(), ""),
    };
    let key = match key.to_lowercase().as_str() {
        "package" | "name" | "package name" => MetadataKey::Name,
        "destination" => MetadataKey::Destination,
        "resort" => MetadataKey::Resort,
        "currency" => MetadataKey::Currency,
        _ => return None,
    };
    let value = if inline.is_empty() {
        line.cells
            .iter()
            .skip(1)
            .find(|cell| !cell.is_empty())
            .cloned()
            .unwrap_or_default()
    } else {
        inline.to_string()
    };
    Some((key, value))
}

fn tier_of(cell: &str) -> Option<(u32, u32)> {
    let caps = TIER_RE.captures(cell)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

fn nights_of(cell: &str) -> Option<u32> {
    NIGHTS_RE.captures(cell)?[1].parse().ok()
}

#[derive(Debug, Clone, Copy)]
struct HeaderColumn {
    tier: (u32, u32),
    nights: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderLayout {
    /// Each pricing cell carries both the tier and the nights
    Combined,
    /// Tier row followed by a nights row
    Paired,
}

fn find_header(lines: &[Line]) -> Option<(usize, HeaderLayout)> {
    for (idx, line) in lines.iter().enumerate() {
        let pricing_cells = || line.cells.iter().skip(1);
        if pricing_cells().any(|c| tier_of(c).is_some() && nights_of(c).is_some()) {
            return Some((idx, HeaderLayout::Combined));
        }
        if pricing_cells().any(|c| tier_of(c).is_some()) {
            if let Some(next) = lines.get(idx + 1) {
                if next.cells.iter().skip(1).any(|c| nights_of(c).is_some()) {
                    return Some((idx, HeaderLayout::Paired));
                }
            }
        }
    }
    None
}

fn combined_columns(line: &Line, diagnostics: &mut Vec<Diagnostic>) -> Vec<HeaderColumn> {
    let mut columns = Vec::new();
    for (j, cell) in line.cells.iter().enumerate().skip(1) {
        if cell.is_empty() {
            continue;
        }
        match (tier_of(cell), nights_of(cell)) {
            (Some(tier), Some(nights)) => columns.push(HeaderColumn { tier, nights }),
            _ => diagnostics.push(
                Diagnostic::warning(
                    DiagnosticKind::ColumnFormat,
                    Some(line.number),
                    format!(
                        "column '{}' does not look like '<min>-<max> People <n> Nights'; ignored",
                        cell
                    ),
                )
                .at_column(j + 1),
            ),
        }
    }
    columns
}

fn paired_columns(
    tier_line: &Line,
    nights_line: &Line,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<HeaderColumn> {
    let width = tier_line.cells.len().max(nights_line.cells.len());
    let mut current_tier: Option<(u32, u32)> = None;
    let mut columns = Vec::new();

    for j in 1..width {
        let tier_cell = tier_line.cells.get(j).map(String::as_str).unwrap_or("");
        if !tier_cell.is_empty() {
            current_tier = tier_of(tier_cell);
            if current_tier.is_none() {
                diagnostics.push(
                    Diagnostic::warning(
                        DiagnosticKind::ColumnFormat,
                        Some(tier_line.number),
                        format!("'{}' is not a '<min>-<max> People' tier; ignored", tier_cell),
                    )
                    .at_column(j + 1),
                );
            }
        }

        let nights_cell = nights_line.cells.get(j).map(String::as_str).unwrap_or("");
        if nights_cell.is_empty() {
            continue;
        }
        match (current_tier, nights_of(nights_cell)) {
            (Some(tier), Some(nights)) => columns.push(HeaderColumn { tier, nights }),
            (_, None) => diagnostics.push(
                Diagnostic::warning(
                    DiagnosticKind::ColumnFormat,
                    Some(nights_line.number),
                    format!("'{}' is not a '<n> Nights' column; ignored", nights_cell),
                )
                .at_column(j + 1),
            ),
            (None, Some(_)) => {}
        }
    }

    columns
}

struct PricingGrid {
    tiers: Vec<GroupSizeTier>,
    /// (tier index, nights) for each pricing column, in header order
    columns: Vec<(u32, u32)>,
    durations: Vec<u32>,
}

fn build_grid(
    columns: &[HeaderColumn],
    header_line: usize,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<PricingGrid> {
    let mut bounds: Vec<(u32, u32)> = Vec::new();
    let mut durations: Vec<u32> = Vec::new();
    for column in columns {
        if !bounds.contains(&column.tier) {
            bounds.push(column.tier);
        }
        if !durations.contains(&column.nights) {
            durations.push(column.nights);
        }
    }

    let mut fatal = false;
    for &(min, max) in &bounds {
        if min == 0 || min > max {
            diagnostics.push(Diagnostic::error(
                DiagnosticKind::InvalidHeader,
                Some(header_line),
                format!("tier {}-{} is not a valid headcount range", min, max),
            ));
            fatal = true;
        }
    }
    for &nights in &durations {
        if nights == 0 {
            diagnostics.push(Diagnostic::error(
                DiagnosticKind::InvalidHeader,
                Some(header_line),
                "0 nights is not a valid duration".to_string(),
            ));
            fatal = true;
        }
    }

    let tiers: Vec<GroupSizeTier> = bounds
        .iter()
        .map(|&(min, max)| GroupSizeTier::new(min, max))
        .collect();
    for (i, a) in tiers.iter().enumerate() {
        for b in tiers.iter().skip(i + 1) {
            if a.overlaps(b) {
                diagnostics.push(Diagnostic::error(
                    DiagnosticKind::OverlappingTiers,
                    Some(header_line),
                    format!("tiers '{}' and '{}' overlap", a.label, b.label),
                ));
                fatal = true;
            }
        }
    }

    let mut seen = HashSet::new();
    let mut mapped = Vec::with_capacity(columns.len());
    for column in columns {
        let tier_index = bounds
            .iter()
            .position(|b| *b == column.tier)
            .unwrap_or_default() as u32;
        if !seen.insert((tier_index, column.nights)) {
            diagnostics.push(Diagnostic::error(
                DiagnosticKind::InvalidHeader,
                Some(header_line),
                format!(
                    "column {}-{} People {} Nights appears more than once",
                    column.tier.0, column.tier.1, column.nights
                ),
            ));
            fatal = true;
        }
        mapped.push((tier_index, column.nights));
    }

    let expected = tiers.len() * durations.len();
    if mapped.len() != expected {
        diagnostics.push(Diagnostic::error(
            DiagnosticKind::InvalidHeader,
            Some(header_line),
            format!(
                "header has {} pricing columns but {} tiers x {} durations needs {}",
                mapped.len(),
                tiers.len(),
                durations.len(),
                expected
            ),
        ));
        fatal = true;
    }

    if fatal {
        return None;
    }

    Some(PricingGrid {
        tiers,
        columns: mapped,
        durations,
    })
}

/// Month name, or a label embedding a start and end date.
pub fn parse_period(label: &str) -> Result<PricingPeriod, String> {
    if let Some(month) = PricingPeriod::month_from_label(label) {
        return Ok(month);
    }

    let found: Vec<regex::Match> = DATE_RE.find_iter(label).collect();
    if found.len() != 2 {
        return Err(format!(
            "period '{}' is neither a month nor a named date range",
            label
        ));
    }

    let parse = |m: &regex::Match| {
        NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(m.as_str(), "%d/%m/%Y"))
            .map_err(|_| format!("'{}' is not a valid date", m.as_str()))
    };
    let start_date = parse(&found[0])?;
    let end_date = parse(&found[1])?;
    if start_date > end_date {
        return Err(format!(
            "period '{}' ends before it starts",
            label
        ));
    }

    let name = label[..found[0].start()]
        .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, '(' | '-' | '–' | ':' | ','))
        .trim()
        .to_string();
    let name = if name.is_empty() {
        label.trim().to_string()
    } else {
        name
    };

    Ok(PricingPeriod::Special {
        name,
        start_date,
        end_date,
    })
}

/// `ON REQUEST` in any case or spacing, otherwise a non-negative amount with
/// currency symbols and thousands separators stripped.
pub fn parse_price(cell: &str) -> Result<Price, String> {
    let cell = cell.trim();
    if ON_REQUEST_RE.is_match(cell) {
        return Ok(Price::OnRequest);
    }

    let cleaned: String = cell
        .chars()
        .filter(|c| !matches!(c, '£' | '€' | '$' | ',' | ' ' | '\u{00A0}'))
        .collect();
    if cleaned.is_empty() {
        return Err("price cell is empty".to_string());
    }

    let amount: Decimal = cleaned
        .parse()
        .map_err(|_| format!("'{}' is not a price or ON REQUEST", cell))?;
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(format!("price '{}' is negative", cell));
    }
    Ok(Price::Fixed(amount))
}

fn parse_pricing_rows(
    lines: &[Line],
    grid: &PricingGrid,
    diagnostics: &mut Vec<Diagnostic>,
) -> (Vec<PricingRow>, usize) {
    let expected = grid.columns.len();
    let mut rows: Vec<PricingRow> = Vec::new();
    let mut consumed = 0;

    for line in lines {
        if line.is_blank() || section_header(line).is_some() {
            break;
        }
        consumed += 1;

        let mut prices: Vec<&String> = line.cells.iter().skip(1).collect();
        while prices.last().is_some_and(|cell| cell.is_empty()) {
            prices.pop();
        }

        if prices.len() != expected {
            diagnostics.push(Diagnostic::error(
                DiagnosticKind::RowLength,
                Some(line.number),
                format!("expected {} prices, found {}", expected, prices.len()),
            ));
            continue;
        }

        let period = match parse_period(line.first()) {
            Ok(period) => period,
            Err(message) => {
                diagnostics.push(
                    Diagnostic::error(DiagnosticKind::InvalidPeriod, Some(line.number), message)
                        .at_column(1),
                );
                continue;
            }
        };

        if rows.iter().any(|row| row.period.label() == period.label()) {
            diagnostics.push(Diagnostic::warning(
                DiagnosticKind::DuplicatePeriod,
                Some(line.number),
                format!(
                    "period '{}' is listed more than once; the first row wins",
                    period.label()
                ),
            ));
        }

        let mut cells = Vec::with_capacity(expected);
        for (k, raw) in prices.iter().enumerate() {
            let (tier_index, nights) = grid.columns[k];
            match parse_price(raw) {
                Ok(price) => cells.push(PriceCell {
                    tier_index,
                    nights,
                    price,
                }),
                Err(message) => diagnostics.push(
                    Diagnostic::error(DiagnosticKind::InvalidPrice, Some(line.number), message)
                        .at_column(k + 2),
                ),
            }
        }

        rows.push(PricingRow {
            period,
            prices: cells,
        });
    }

    (rows, consumed)
}

#[derive(Default)]
struct Sections {
    inclusions: Vec<Inclusion>,
    accommodation: Vec<String>,
    notes: Vec<String>,
}

fn parse_sections(lines: &[Line], diagnostics: &mut Vec<Diagnostic>) -> Sections {
    let mut sections = Sections::default();
    let mut current: Option<Section> = None;
    let mut category = DEFAULT_CATEGORY.to_string();

    for line in lines {
        if line.is_blank() {
            continue;
        }

        let (section, text) = match section_header(line) {
            Some((section, rest)) => {
                current = Some(section);
                category = DEFAULT_CATEGORY.to_string();
                if rest.is_empty() {
                    continue;
                }
                (section, rest)
            }
            None => match current {
                Some(section) => (section, line.text()),
                None => {
                    diagnostics.push(Diagnostic::warning(
                        DiagnosticKind::UnexpectedContent,
                        Some(line.number),
                        format!("'{}' is outside any section; ignored", line.text()),
                    ));
                    continue;
                }
            },
        };

        let bullet = BULLET_RE
            .captures(&text)
            .map(|caps| caps[1].trim().to_string());

        match (section, bullet) {
            (Section::Notes, bullet) => sections.notes.push(bullet.unwrap_or(text)),
            (_, Some(item)) if item.is_empty() => {}
            (Section::Inclusions, Some(item)) => sections.inclusions.push(Inclusion {
                text: item,
                category: category.clone(),
            }),
            (Section::Inclusions, None) if text.ends_with(':') => {
                category = text.trim_end_matches(':').trim().to_string();
            }
            (Section::Accommodation, Some(item)) => sections.accommodation.push(item),
            (section, None) => {
                diagnostics.push(Diagnostic::warning(
                    DiagnosticKind::UnrecognizedBullet,
                    Some(line.number),
                    "list item has no '-', '•' or '*' bullet".to_string(),
                ));
                match section {
                    Section::Inclusions => sections.inclusions.push(Inclusion {
                        text,
                        category: category.clone(),
                    }),
                    _ => sections.accommodation.push(text),
                }
            }
        }
    }

    sections
}

/// Parses a package sheet. Any error-severity diagnostic refuses the import;
/// warnings travel with the draft.
pub fn parse_package_csv(text: &str) -> Result<ParsedPackage, ParseFailure> {
    let mut diagnostics = Vec::new();
    let lines = read_lines(text, &mut diagnostics);

    let header = find_header(&lines);
    let metadata_end = header
        .map(|(idx, _)| idx)
        .unwrap_or(lines.len())
        .min(METADATA_LINES);

    let mut draft = PackageDraft::default();
    let mut currency_seen = false;
    for line in &lines[..metadata_end] {
        match metadata_entry(line) {
            Some((MetadataKey::Name, value)) => draft.name = value,
            Some((MetadataKey::Destination, value)) => draft.destination = value,
            Some((MetadataKey::Resort, value)) => draft.resort = value,
            Some((MetadataKey::Currency, value)) => {
                currency_seen = true;
                draft.currency = Currency::parse_label(&value).unwrap_or_else(|| {
                    diagnostics.push(Diagnostic::warning(
                        DiagnosticKind::MissingMetadata,
                        Some(line.number),
                        format!("currency '{}' not recognised; using EUR", value),
                    ));
                    Currency::Eur
                });
            }
            None => {}
        }
    }
    if draft.name.is_empty() {
        diagnostics.push(Diagnostic::warning(
            DiagnosticKind::MissingMetadata,
            None,
            "no 'Package:' or 'Name:' line found in the first 10 lines".to_string(),
        ));
    }
    if !currency_seen {
        draft.currency = Currency::Eur;
    }

    let Some((header_idx, layout)) = header else {
        diagnostics.push(Diagnostic::error(
            DiagnosticKind::MissingHeader,
            None,
            "no pricing header found; expected columns like '6-11 People 3 Nights'".to_string(),
        ));
        return Err(ParseFailure { diagnostics });
    };

    let header_line = lines[header_idx].number;
    let (columns, body_start) = match layout {
        HeaderLayout::Combined => (
            combined_columns(&lines[header_idx], &mut diagnostics),
            header_idx + 1,
        ),
        HeaderLayout::Paired => (
            paired_columns(&lines[header_idx], &lines[header_idx + 1], &mut diagnostics),
            header_idx + 2,
        ),
    };

    let Some(grid) = build_grid(&columns, header_line, &mut diagnostics) else {
        return Err(ParseFailure { diagnostics });
    };

    let (rows, consumed) = parse_pricing_rows(&lines[body_start..], &grid, &mut diagnostics);
    if rows.is_empty() {
        diagnostics.push(Diagnostic::error(
            DiagnosticKind::EmptyPricingTable,
            Some(header_line),
            "pricing table has no valid rows".to_string(),
        ));
    }

    let sections = parse_sections(&lines[body_start + consumed..], &mut diagnostics);

    if diagnostics.iter().any(Diagnostic::is_error) {
        return Err(ParseFailure { diagnostics });
    }

    let mut duration_options = grid.durations.clone();
    duration_options.sort_unstable();

    draft.group_size_tiers = grid.tiers;
    draft.duration_options = duration_options;
    draft.pricing_matrix = rows;
    draft.inclusions = sections.inclusions;
    draft.accommodation_examples = sections.accommodation;
    draft.sales_notes = sanitize_sales_notes(&sections.notes.join("\n"));

    Ok(ParsedPackage {
        draft,
        warnings: diagnostics,
    })
}

fn period_cell(period: &PricingPeriod) -> String {
    match period {
        PricingPeriod::Month { .. } => period.label(),
        PricingPeriod::Special {
            name,
            start_date,
            end_date,
        } => format!(
            "{} ({} to {})",
            name,
            start_date.format("%Y-%m-%d"),
            end_date.format("%Y-%m-%d")
        ),
    }
}

/// Writes a package back out in the layout `parse_package_csv` reads.
pub fn export_package_csv(draft: &PackageDraft) -> Result<String, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());

    writer.write_record(["Package:", draft.name.as_str()])?;
    writer.write_record(["Destination:", draft.destination.as_str()])?;
    writer.write_record(["Resort:", draft.resort.as_str()])?;
    writer.write_record(["Currency:", draft.currency.code()])?;
    writer.write_record([""])?;

    let mut durations = draft.duration_options.clone();
    durations.sort_unstable();

    let mut header = vec!["Period".to_string()];
    let mut columns = Vec::new();
    for (tier_index, tier) in draft.group_size_tiers.iter().enumerate() {
        for &nights in &durations {
            header.push(format!(
                "{}-{} People {} Nights",
                tier.min_people, tier.max_people, nights
            ));
            columns.push((tier_index as u32, nights));
        }
    }
    writer.write_record(&header)?;

    for row in &draft.pricing_matrix {
        let mut record = vec![period_cell(&row.period)];
        for &(tier_index, nights) in &columns {
            record.push(match row.price_for(tier_index, nights) {
                Some(Price::Fixed(amount)) => amount.to_string(),
                Some(Price::OnRequest) => ON_REQUEST.replace('_', " "),
                None => String::new(),
            });
        }
        writer.write_record(&record)?;
    }

    if !draft.inclusions.is_empty() {
        writer.write_record([""])?;
        writer.write_record(["Inclusions:"])?;
        let mut category = DEFAULT_CATEGORY;
        for inclusion in &draft.inclusions {
            if inclusion.category != category {
                category = inclusion.category.as_str();
                writer.write_record([format!("{}:", category)])?;
            }
            writer.write_record([format!("- {}", inclusion.text)])?;
        }
    }

    if !draft.accommodation_examples.is_empty() {
        writer.write_record([""])?;
        writer.write_record(["Accommodation:"])?;
        for hotel in &draft.accommodation_examples {
            writer.write_record([format!("- {}", hotel)])?;
        }
    }

    if !draft.sales_notes.trim().is_empty() {
        writer.write_record([""])?;
        writer.write_record(["Sales Notes:"])?;
        for note in draft.sales_notes.lines().filter(|l| !l.trim().is_empty()) {
            writer.write_record([note])?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))?;
    String::from_utf8(bytes)
        .map_err(|e| csv::Error::from(io::Error::new(io::ErrorKind::InvalidData, e)))
}
