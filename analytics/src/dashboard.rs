//! Dashboard document: summary cards, chart specifications and tables, as a
//! pure function of an [`Analysis`].

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use common::model::ProductionRecord;
use serde::Serialize;

use crate::aggregation::{FailureTotal, PeriodProduction};
use crate::analysis::Analysis;
use crate::forecast::ForecastRecord;

pub const EMPTY_DATASET_MESSAGE: &str = "No production data loaded; run the ETL first.";
pub const NO_FORECAST_MESSAGE: &str = "Not enough data for a forecast.";

pub const CHART_FAILURES_PER_MACHINE: &str = "falhas_por_maquina";
pub const CHART_DAILY_PRODUCTION: &str = "producao_por_dia";
pub const CHART_MONTHLY_PRODUCTION: &str = "producao_mensal";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryCards {
    pub machines_selected: usize,
    pub days_in_range: usize,
    pub mean_daily_production: f64,
    pub total_failures: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Line,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub x: String,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSpec {
    pub id: String,
    pub title: String,
    pub kind: ChartKind,
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<Series>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakProduction {
    pub machine_id: String,
    pub date: NaiveDate,
    pub production_quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryTables {
    pub daily: Vec<PeriodProduction>,
    pub weekly: Vec<PeriodProduction>,
    pub monthly: Vec<PeriodProduction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub cards: SummaryCards,
    pub charts: Vec<ChartSpec>,
    pub tables: SummaryTables,
    pub forecast: Vec<ForecastRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast_note: Option<String>,
    pub peak_production: Option<PeakProduction>,
    pub dropped_invalid_dates: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DashboardView {
    Ready(Box<Dashboard>),
    Empty { message: String },
}

impl DashboardView {
    pub fn is_empty(&self) -> bool {
        matches!(self, DashboardView::Empty { .. })
    }
}

pub fn render(analysis: &Analysis) -> DashboardView {
    let records: Vec<&ProductionRecord> =
        analysis.dataset.records.iter().map(|r| &r.record).collect();
    if records.is_empty() {
        return DashboardView::Empty {
            message: EMPTY_DATASET_MESSAGE.to_string(),
        };
    }

    let forecast_note = analysis
        .forecasts
        .is_empty()
        .then(|| NO_FORECAST_MESSAGE.to_string());

    DashboardView::Ready(Box::new(Dashboard {
        cards: summary_cards(&records, analysis.machines_selected),
        charts: vec![
            failures_chart(&analysis.failures_by_machine),
            per_machine_chart(
                CHART_DAILY_PRODUCTION,
                "Mean daily production per machine",
                "Date",
                &analysis.daily_production,
            ),
            per_machine_chart(
                CHART_MONTHLY_PRODUCTION,
                "Mean monthly production per machine",
                "Month",
                &analysis.monthly_production,
            ),
        ],
        tables: SummaryTables {
            daily: analysis.daily_production.clone(),
            weekly: analysis.weekly_production.clone(),
            monthly: analysis.monthly_production.clone(),
        },
        forecast: analysis.forecasts.clone(),
        forecast_note,
        peak_production: peak_production(&records),
        dropped_invalid_dates: analysis.dataset.dropped_invalid_dates,
    }))
}

fn summary_cards(records: &[&ProductionRecord], machines_selected: usize) -> SummaryCards {
    let days: HashSet<NaiveDate> = records.iter().map(|r| r.date).collect();
    let total_production: f64 = records.iter().map(|r| r.production_quantity).sum();
    SummaryCards {
        machines_selected,
        days_in_range: days.len(),
        mean_daily_production: total_production / records.len() as f64,
        total_failures: records.iter().map(|r| r.failure_count).sum(),
    }
}

/// First record with the highest production; earlier rows win ties.
fn peak_production(records: &[&ProductionRecord]) -> Option<PeakProduction> {
    let mut peak: Option<&ProductionRecord> = None;
    for &record in records {
        if peak.is_none_or(|p| record.production_quantity > p.production_quantity) {
            peak = Some(record);
        }
    }
    peak.map(|r| PeakProduction {
        machine_id: r.machine_id.clone(),
        date: r.date,
        production_quantity: r.production_quantity,
    })
}

fn failures_chart(totals: &[FailureTotal]) -> ChartSpec {
    ChartSpec {
        id: CHART_FAILURES_PER_MACHINE.to_string(),
        title: "Total failures per machine".to_string(),
        kind: ChartKind::Bar,
        x_label: "Machine".to_string(),
        y_label: "Failures".to_string(),
        series: vec![Series {
            name: "falhas".to_string(),
            points: totals
                .iter()
                .map(|t| Point {
                    x: t.machine_id.clone(),
                    y: t.total_failures as f64,
                })
                .collect(),
        }],
    }
}

/// One line per machine, points in period order.
fn per_machine_chart(id: &str, title: &str, x_label: &str, rows: &[PeriodProduction]) -> ChartSpec {
    let mut by_machine: BTreeMap<&str, Vec<Point>> = BTreeMap::new();
    for row in rows {
        by_machine
            .entry(row.machine_id.as_str())
            .or_default()
            .push(Point {
                x: row.period.clone(),
                y: row.mean_production,
            });
    }

    ChartSpec {
        id: id.to_string(),
        title: title.to_string(),
        kind: ChartKind::Line,
        x_label: x_label.to_string(),
        y_label: "Production (pieces)".to_string(),
        series: by_machine
            .into_iter()
            .map(|(machine, points)| Series {
                name: machine.to_string(),
                points,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use crate::cleaning::{CleanedDataset, clean};
    use common::model::{RawRecord, RecordTable};
    use common::parse::format_date;
    use etl::rules::CleaningRules;

    fn raw(machine: &str, day: u32, failures: f64, production: f64) -> RawRecord {
        RawRecord {
            machine_id: machine.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 5, day),
            hours_worked: Some(10.0),
            failure_count: Some(failures),
            production_quantity: Some(production),
            failure_timestamp: None,
        }
    }

    async fn analysis_of(records: Vec<RawRecord>) -> Analysis {
        let dataset = clean(&RecordTable::new(records, false), &CleaningRules::default());
        let machines = dataset.machines().len();
        analyze(dataset, machines, 3).await.unwrap()
    }

    #[tokio::test]
    async fn test_empty_dataset_renders_message() {
        let analysis = analyze(CleanedDataset::default(), 0, 3).await.unwrap();
        let view = render(&analysis);
        assert_eq!(
            view,
            DashboardView::Empty {
                message: EMPTY_DATASET_MESSAGE.to_string()
            }
        );
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "empty");
    }

    #[tokio::test]
    async fn test_cards_and_charts() {
        let analysis = analysis_of(vec![
            raw("A1", 1, 1.0, 50.0),
            raw("A1", 2, 0.0, 70.0),
            raw("B1", 2, 3.0, 90.0),
        ])
        .await;

        let DashboardView::Ready(dashboard) = render(&analysis) else {
            panic!("expected a ready dashboard");
        };
        assert_eq!(
            dashboard.cards,
            SummaryCards {
                machines_selected: 2,
                days_in_range: 2,
                mean_daily_production: 70.0,
                total_failures: 4,
            }
        );

        let ids: Vec<&str> = dashboard.charts.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                CHART_FAILURES_PER_MACHINE,
                CHART_DAILY_PRODUCTION,
                CHART_MONTHLY_PRODUCTION
            ]
        );
        let failures = &dashboard.charts[0].series[0].points;
        assert_eq!(failures[0].x, "B1");
        assert_eq!(failures[0].y, 3.0);

        let daily = &dashboard.charts[1];
        assert_eq!(daily.series.len(), 2);
        assert_eq!(daily.series[0].name, "A1");
        assert_eq!(
            daily.series[0].points[1].x,
            format_date(NaiveDate::from_ymd_opt(2024, 5, 2).unwrap())
        );
        assert!(dashboard.forecast_note.is_none());
    }

    #[tokio::test]
    async fn test_peak_production_prefers_first_on_ties() {
        let analysis = analysis_of(vec![
            raw("A1", 1, 0.0, 40.0),
            raw("B1", 1, 0.0, 90.0),
            raw("A1", 2, 0.0, 90.0),
        ])
        .await;
        let DashboardView::Ready(dashboard) = render(&analysis) else {
            panic!("expected a ready dashboard");
        };
        let peak = dashboard.peak_production.unwrap();
        assert_eq!(peak.machine_id, "B1");
        assert_eq!(peak.production_quantity, 90.0);
    }
}
