use std::collections::HashSet;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use tracing::info;

use super::{LoaderContext, LoaderReport};
use crate::error::{EtlError, Result};
use crate::schema::CALENDAR;
use crate::sink::UpsertBatch;
use crate::source::DateRange;
use crate::types::Record;

pub const HOLIDAYS_FILE: &str = "holidays.csv";

const MONTH_NAMES: [&str; 12] = [
    "Enero",
    "Febrero",
    "Marzo",
    "Abril",
    "Mayo",
    "Junio",
    "Julio",
    "Agosto",
    "Septiembre",
    "Octubre",
    "Noviembre",
    "Diciembre",
];

fn day_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Lunes",
        Weekday::Tue => "Martes",
        Weekday::Wed => "Miércoles",
        Weekday::Thu => "Jueves",
        Weekday::Fri => "Viernes",
        Weekday::Sat => "Sábado",
        Weekday::Sun => "Domingo",
    }
}

/// 2020-01-01 through 2030-12-31.
pub fn default_range() -> Result<DateRange> {
    let bound = |year, month, day| {
        NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| {
                EtlError::Validation(format!("invalid calendar bound {year}-{month}-{day}"))
            })
    };
    DateRange::new(bound(2020, 1, 1)?, bound(2030, 12, 31)?)
}

fn is_business_day(date: NaiveDate, holidays: &HashSet<NaiveDate>) -> bool {
    date.weekday() != Weekday::Sun && !holidays.contains(&date)
}

/// Business-day ordinal of every day of a month (None on non-business
/// days) and the month's business-day count.
fn month_business_days(
    any_day: NaiveDate,
    holidays: &HashSet<NaiveDate>,
) -> (Vec<Option<i64>>, i64) {
    let first = any_day - Duration::days(i64::from(any_day.day0()));
    let mut ordinals = Vec::with_capacity(31);
    let mut count = 0;
    for day in first.iter_days().take_while(|day| day.month() == first.month()) {
        if is_business_day(day, holidays) {
            count += 1;
            ordinals.push(Some(count));
        } else {
            ordinals.push(None);
        }
    }
    (ordinals, count)
}

/// One `dim_time` row per day of `range`. Business-day figures always cover
/// the whole calendar month, also when the range starts or ends mid-month.
pub fn calendar_rows(range: DateRange, holidays: &HashSet<NaiveDate>) -> Vec<Record> {
    let mut rows = Vec::new();
    let mut month: Option<(i32, u32, Vec<Option<i64>>, i64)> = None;

    for date in range.start.iter_days().take_while(|date| *date <= range.end) {
        let stale = month
            .as_ref()
            .map_or(true, |(year, number, ..)| (*year, *number) != (date.year(), date.month()));
        if stale {
            let (ordinals, total) = month_business_days(date, holidays);
            month = Some((date.year(), date.month(), ordinals, total));
        }
        let (ordinal, total) = match &month {
            Some((_, _, ordinals, total)) => (
                ordinals.get(date.day0() as usize).copied().flatten(),
                *total,
            ),
            None => (None, 0),
        };

        let month_index = date.month0() as usize;
        rows.push(
            Record::new()
                .with("date_key", date)
                .with("year", i64::from(date.year()))
                .with("month", i64::from(date.month()))
                .with("month_name", MONTH_NAMES[month_index])
                .with("quarter", i64::from(date.month0() / 3 + 1))
                .with("bimester", i64::from(date.month0() / 2 + 1))
                .with("iso_week", i64::from(date.iso_week().week()))
                .with("day_of_month", i64::from(date.day()))
                .with("day_name", day_name(date.weekday()))
                .with("is_weekend", date.weekday() == Weekday::Sun)
                .with("is_holiday", holidays.contains(&date))
                .with("is_business_day", ordinal.is_some())
                .with("business_day_of_month", ordinal)
                .with("business_days_in_month", total),
        );
    }

    rows
}

fn read_holidays(ctx: &LoaderContext<'_>, report: &mut LoaderReport) -> Result<HashSet<NaiveDate>> {
    let Some(rows) = ctx.manual.read_optional(HOLIDAYS_FILE, &["date"])? else {
        report.note(format!("{HOLIDAYS_FILE} not found; no holidays marked"));
        return Ok(HashSet::new());
    };

    rows.iter()
        .enumerate()
        .filter(|(_, row)| !row.get("date").is_blank())
        .map(|(index, row)| {
            row.date("date").ok_or_else(|| {
                EtlError::Validation(format!(
                    "{HOLIDAYS_FILE} row {}: unreadable date {:?}",
                    index + 1,
                    row.get("date").to_text()
                ))
            })
        })
        .collect()
}

/// Regenerate `dim_time` for `range`, overwriting the attributes of days
/// already present.
pub async fn load(ctx: &LoaderContext<'_>, range: DateRange) -> Result<LoaderReport> {
    let mut report = LoaderReport::new("calendar");
    let holidays = read_holidays(ctx, &mut report)?;

    let rows = calendar_rows(range, &holidays);
    report.extracted = rows.len();

    let batch = UpsertBatch::new(&CALENDAR, format!("calendar:{range}"), rows, ctx.chunk_size());
    report.sink.absorb(ctx.warehouse.merge_upsert(&batch).await?);

    info!(
        %range,
        days = report.extracted,
        holidays = holidays.len(),
        "Calendar generated"
    );
    Ok(report)
}
