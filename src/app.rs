use crate::insights::{
    AnalystReply, Customer, ForecastPoint, LocationRevenue, Review, Segment, SentimentSummary,
    TodayKpis, format_usd, segment_counts,
};
use crate::queries;
use crate::session::{RowSet, WarehouseSession};
use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use eframe::egui;
use egui::{Color32, Context, RichText, Ui};
use egui_plot::{Bar, BarChart, Legend, Line, LineStyle, Plot, PlotPoints};
use std::collections::BTreeMap;
use std::sync::{Arc, mpsc};

const REVIEW_LIMIT: usize = 20;
const CUSTOMER_LIMIT: usize = 50;
const LIVE_WINDOW_DAYS: u32 = 7;

const SAMPLE_QUESTIONS: [&str; 5] = [
    "What were our top 5 pizzas last month?",
    "Compare revenue by location",
    "Show daily order trends",
    "Who are our best customers?",
    "What's our average order value?",
];

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Ask,
    Sentiment,
    Forecast,
    Segments,
    Live,
}

impl Mode {
    const ALL: [Mode; 5] = [
        Mode::Ask,
        Mode::Sentiment,
        Mode::Forecast,
        Mode::Segments,
        Mode::Live,
    ];

    fn title(self) -> &'static str {
        match self {
            Mode::Ask => "💬 Ask Questions",
            Mode::Sentiment => "😊 Sentiment Analysis",
            Mode::Forecast => "📊 Sales Forecast",
            Mode::Segments => "🎯 Customer Segments",
            Mode::Live => "📈 Live Dashboard",
        }
    }

    fn heading(self) -> &'static str {
        match self {
            Mode::Ask => "Ask Questions in Natural Language",
            Mode::Sentiment => "Customer Review Sentiment Analysis",
            Mode::Forecast => "Sales Forecasting",
            Mode::Segments => "Customer Segmentation (RFM Analysis)",
            Mode::Live => "Live Operations Dashboard",
        }
    }
}

/// Payload of one completed fetch. Discarded whenever the user changes mode
/// or refreshes; there is no local persistence.
enum View {
    Analyst {
        reply: AnalystReply,
        table: Option<RowSet>,
    },
    Sentiment {
        reviews: Vec<Review>,
        summary: Option<SentimentSummary>,
    },
    Forecast(Vec<ForecastPoint>),
    Segments(Vec<Customer>),
    Live {
        today: TodayKpis,
        locations: Vec<LocationRevenue>,
    },
}

struct Viz {
    show_bounds: bool,
    plot_hovered: bool,
}

pub struct DashboardApp {
    session: Arc<dyn WarehouseSession>,
    namespace: String,
    mode: Mode,

    question: String,
    forecast_days: u32,

    view: Option<View>,
    error: Option<String>,
    loading: bool,
    // Channel for results coming back from the fetch thread, tagged with
    // the mode that started the fetch
    tx: mpsc::Sender<(Mode, Result<View>)>,
    rx: mpsc::Receiver<(Mode, Result<View>)>,
    viz: Viz,
}

impl DashboardApp {
    pub fn new(session: Arc<dyn WarehouseSession>, namespace: String) -> Self {
        let (tx, rx) = mpsc::channel::<(Mode, Result<View>)>();
        Self {
            session,
            namespace,
            mode: Mode::Ask,
            question: String::new(),
            forecast_days: 14,
            view: None,
            error: None,
            loading: false,
            tx,
            rx,
            viz: Viz {
                show_bounds: true,
                plot_hovered: false,
            },
        }
    }

    /// Runs one async fetch job on a worker thread (each mode's queries block
    /// the view until the warehouse answers; there is no cancellation).
    fn spawn_fetch<F, Fut>(&mut self, mode: Mode, job: F)
    where
        F: FnOnce(Arc<dyn WarehouseSession>, String) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<View>> + 'static,
    {
        let session = self.session.clone();
        let ns = self.namespace.clone();
        let tx = self.tx.clone();

        std::thread::spawn(move || {
            let result = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt.block_on(job(session, ns)),
                Err(e) => Err(e.into()),
            };
            let _ = tx.send((mode, result));
        });

        self.loading = true;
        self.error = None;
    }

    fn check_for_data(&mut self) {
        while let Ok((mode, result)) = self.rx.try_recv() {
            // A result can arrive after the user already switched mode.
            // Such a message is stale in both branches: neither its payload
            // nor its error belongs to the current view, and the spinner
            // still tracks the fetch the new mode started.
            if mode != self.mode {
                continue;
            }
            self.loading = false;
            match result {
                Ok(view) => self.view = Some(view),
                Err(e) => {
                    log::error!("Fetch failed: {:#}", e);
                    self.error = Some(e.to_string());
                }
            }
        }
    }

    fn ask_question(&mut self) {
        let question = self.question.trim().to_string();
        if question.is_empty() {
            return;
        }
        self.view = None;
        self.spawn_fetch(Mode::Ask, move |session, ns| async move {
            let raw = session.query(&queries::analyst_query(&ns, &question)).await?;
            let reply = AnalystReply::parse(raw.str_at(0, "RESPONSE").unwrap_or("{}"))?;
            // Run the generated SQL so the answer comes with its data
            let table = match &reply.sql {
                Some(sql) => Some(session.query(sql).await?),
                None => None,
            };
            Ok(View::Analyst { reply, table })
        });
    }

    fn load_sentiment(&mut self) {
        self.spawn_fetch(Mode::Sentiment, |session, ns| async move {
            let rows = session
                .query(&queries::sentiment_query(&ns, REVIEW_LIMIT))
                .await?;
            let reviews = Review::from_rows(&rows);
            let summary = SentimentSummary::from_reviews(&reviews);
            Ok(View::Sentiment { reviews, summary })
        });
    }

    fn run_forecast(&mut self) {
        let days = self.forecast_days;
        self.view = None;
        self.spawn_fetch(Mode::Forecast, move |session, ns| async move {
            // Train first; the forecast itself runs as a table function in
            // a single statement, so the two requests stay independent.
            session.query(&queries::forecast_create(&ns)).await?;
            let rows = session.query(&queries::forecast_query(&ns, days)).await?;
            Ok(View::Forecast(ForecastPoint::from_rows(&rows)))
        });
    }

    fn load_segments(&mut self) {
        self.spawn_fetch(Mode::Segments, |session, ns| async move {
            let rows = session
                .query(&queries::rfm_query(&ns, CUSTOMER_LIMIT))
                .await?;
            Ok(View::Segments(Customer::from_rows(&rows)))
        });
    }

    fn load_live(&mut self) {
        self.spawn_fetch(Mode::Live, |session, ns| async move {
            let today = session.query(&queries::today_kpis(&ns)).await?;
            let locations = session
                .query(&queries::location_revenue(&ns, LIVE_WINDOW_DAYS))
                .await?;
            Ok(View::Live {
                today: TodayKpis::from_rows(&today),
                locations: LocationRevenue::from_rows(&locations),
            })
        });
    }

    fn on_mode_change(&mut self) {
        self.view = None;
        self.error = None;
        match self.mode {
            Mode::Sentiment => self.load_sentiment(),
            Mode::Segments => self.load_segments(),
            Mode::Live => self.load_live(),
            // Button-driven modes wait for input
            Mode::Ask | Mode::Forecast => {}
        }
    }

    fn sidebar(&mut self, ui: &mut Ui) {
        ui.heading("🍕 Bella Napoli");
        ui.weak("Powered by warehouse AI");
        ui.separator();

        ui.label(RichText::new("Demo Features").strong());
        let previous = self.mode;
        for mode in Mode::ALL {
            ui.radio_value(&mut self.mode, mode, mode.title());
        }
        if self.mode != previous {
            self.on_mode_change();
        }

        ui.separator();
        ui.label(RichText::new("Sample Questions").strong());
        for question in SAMPLE_QUESTIONS {
            ui.small(format!("• {question}"));
        }
    }

    fn ui_ask(&mut self, ui: &mut Ui) {
        ui.label("Query the pizza business without writing SQL.");
        ui.add_space(5.0);

        ui.horizontal(|ui| {
            ui.add(
                egui::TextEdit::singleline(&mut self.question)
                    .hint_text("e.g., What were our top selling pizzas this month?")
                    .desired_width(480.0),
            );
            let can_ask = !self.loading && !self.question.trim().is_empty();
            if ui.add_enabled(can_ask, egui::Button::new("🔍 Ask")).clicked() {
                self.ask_question();
            }
        });

        if self.error.is_some() {
            ui.label("Make sure the semantic model is uploaded to the stage.");
        }

        if let Some(View::Analyst { reply, table }) = &self.view {
            ui.add_space(10.0);
            if let Some(sql) = &reply.sql {
                ui.collapsing("📝 Generated SQL", |ui| {
                    ui.code(sql);
                });
            }
            if let Some(table) = table {
                rowset_grid(ui, "analyst_results", table);
            }
            if let Some(answer) = &reply.answer {
                ui.add_space(5.0);
                ui.colored_label(Color32::from_rgb(46, 125, 50), answer);
            }
        }
    }

    fn ui_sentiment(&mut self, ui: &mut Ui) {
        ui.horizontal(|ui| {
            if ui.add_enabled(!self.loading, egui::Button::new("🔄 Refresh")).clicked() {
                self.load_sentiment();
            }
            ui.weak(format!("Last {REVIEW_LIMIT} reviews"));
        });

        if let Some(View::Sentiment { reviews, summary }) = &self.view {
            if let Some(summary) = summary {
                ui.add_space(10.0);
                ui.horizontal(|ui| {
                    metric(ui, "Avg Sentiment", format!("{:.2}", summary.avg_score));
                    metric(ui, "Positive %", format!("{:.0}%", summary.positive_pct));
                    metric(ui, "Negative %", format!("{:.0}%", summary.negative_pct));
                    metric(ui, "Avg Rating", format!("{:.1} ⭐", summary.avg_rating));
                });
            }
            ui.separator();
            for review in reviews {
                review_row(ui, review);
                ui.separator();
            }
            if reviews.is_empty() && !self.loading {
                ui.label("No reviews with text found.");
            }
        }
    }

    fn ui_forecast(&mut self, ui: &mut Ui) {
        ui.horizontal(|ui| {
            ui.add(egui::Slider::new(&mut self.forecast_days, 7..=30).text("days"));
            if ui
                .add_enabled(!self.loading, egui::Button::new("Generate Forecast"))
                .clicked()
            {
                self.run_forecast();
            }
            ui.checkbox(&mut self.viz.show_bounds, "Confidence bounds");
        });
        if self.loading {
            ui.weak("Training the forecast model can take a minute.");
        }

        let show_bounds = self.viz.show_bounds;
        let mut hovered = false;
        if let Some(View::Forecast(points)) = &self.view {
            ui.add_space(10.0);
            if points.is_empty() {
                ui.label("The forecast returned no rows.");
            } else {
                hovered = forecast_plot(ui, points, show_bounds);
                ui.add_space(10.0);
                ui.collapsing("Forecast table", |ui| {
                    forecast_table(ui, points);
                });
            }
        }
        self.viz.plot_hovered |= hovered;
    }

    fn ui_segments(&mut self, ui: &mut Ui) {
        ui.horizontal(|ui| {
            if ui.add_enabled(!self.loading, egui::Button::new("🔄 Refresh")).clicked() {
                self.load_segments();
            }
            ui.weak(format!("Top {CUSTOMER_LIMIT} customers by lifetime value"));
        });

        let mut hovered = false;
        if let Some(View::Segments(customers)) = &self.view {
            let counts = segment_counts(customers);
            ui.add_space(10.0);
            ui.horizontal(|ui| {
                for (segment, count) in counts {
                    metric(ui, segment.label(), count.to_string());
                }
            });
            ui.add_space(10.0);
            hovered = segment_chart(ui, &counts);
            ui.separator();
            ui.label(RichText::new("Customer Details").strong());
            customer_table(ui, customers);
        }
        self.viz.plot_hovered |= hovered;
    }

    fn ui_live(&mut self, ui: &mut Ui) {
        ui.horizontal(|ui| {
            if ui.add_enabled(!self.loading, egui::Button::new("🔄 Refresh")).clicked() {
                self.load_live();
            }
        });

        let mut hovered = false;
        if let Some(View::Live { today, locations }) = &self.view {
            ui.add_space(10.0);
            ui.label(RichText::new("Today's Performance").strong());
            ui.horizontal(|ui| {
                metric(ui, "Orders Today", today.orders.to_string());
                metric(ui, "Revenue Today", format_usd(today.revenue, 0));
                metric(ui, "Avg Order", format_usd(today.avg_order, 2));
            });

            ui.separator();
            ui.label(RichText::new(format!("Last {LIVE_WINDOW_DAYS} Days by Location")).strong());
            if locations.is_empty() {
                ui.label("No orders in the window.");
            } else {
                hovered = location_chart(ui, locations);
            }
        }
        self.viz.plot_hovered |= hovered;
    }
}

impl eframe::App for DashboardApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        self.check_for_data();
        // Keep polling while a fetch is in flight
        if self.loading {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }

        egui::SidePanel::left("sidebar").show(ctx, |ui| {
            self.sidebar(ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            let mut scroll_area = egui::ScrollArea::vertical();
            if self.viz.plot_hovered {
                // Let the plot own the scroll wheel while hovered
                scroll_area = scroll_area.enable_scrolling(false);
                self.viz.plot_hovered = false;
            }

            scroll_area.show(ui, |ui| {
                ui.heading(self.mode.heading());
                ui.add_space(5.0);

                if self.loading {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label("Waiting for the warehouse...");
                    });
                }
                if let Some(error) = &self.error {
                    ui.colored_label(Color32::RED, format!("Error: {error}"));
                }

                match self.mode {
                    Mode::Ask => self.ui_ask(ui),
                    Mode::Sentiment => self.ui_sentiment(ui),
                    Mode::Forecast => self.ui_forecast(ui),
                    Mode::Segments => self.ui_segments(ui),
                    Mode::Live => self.ui_live(ui),
                }

                ui.add_space(20.0);
                ui.separator();
                ui.vertical_centered(|ui| {
                    ui.weak("Bella Napoli demo | Data is synthetic");
                });
            });
        });
    }
}

fn metric(ui: &mut Ui, label: &str, value: String) {
    egui::Frame::group(ui.style()).show(ui, |ui| {
        ui.vertical(|ui| {
            ui.label(RichText::new(value).heading().strong());
            ui.weak(label);
        });
    });
}

fn review_row(ui: &mut Ui, review: &Review) {
    ui.horizontal(|ui| {
        ui.vertical(|ui| {
            ui.label(
                RichText::new(format!("Review #{} ({:.0}⭐)", review.id, review.rating)).strong(),
            );
            let text: String = if review.text.chars().count() > 200 {
                let truncated: String = review.text.chars().take(200).collect();
                format!("{truncated}...")
            } else {
                review.text.clone()
            };
            ui.label(text);
        });
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Min), |ui| {
            ui.vertical(|ui| {
                ui.label(review.sentiment().label());
                ui.weak(format!("Score: {:.3}", review.score));
            });
        });
    });
}

/// Generic striped table over whatever the warehouse returned.
fn rowset_grid(ui: &mut Ui, id: &str, rows: &RowSet) {
    if rows.is_empty() {
        ui.label("The query returned no rows.");
        return;
    }
    egui::ScrollArea::horizontal()
        .id_source(id)
        .show(ui, |ui| {
            egui::Grid::new(id).striped(true).show(ui, |ui| {
                for column in &rows.columns {
                    ui.label(RichText::new(column).strong());
                }
                ui.end_row();
                for row in 0..rows.len() {
                    for col in 0..rows.columns.len() {
                        ui.label(rows.display(row, col));
                    }
                    ui.end_row();
                }
            });
        });
}

fn date_to_x(date: NaiveDate) -> f64 {
    date.num_days_from_ce() as f64
}

fn date_axis_label(x: f64) -> String {
    NaiveDate::from_num_days_from_ce_opt(x.round() as i32)
        .map(|d| d.format("%b %d").to_string())
        .unwrap_or_default()
}

fn forecast_plot(ui: &mut Ui, points: &[ForecastPoint], show_bounds: bool) -> bool {
    let mut by_location: BTreeMap<&str, Vec<&ForecastPoint>> = BTreeMap::new();
    for point in points {
        by_location.entry(&point.location).or_default().push(point);
    }

    let plot = Plot::new("forecast")
        .allow_zoom(true)
        .allow_drag(true)
        .height(400.0)
        .x_axis_formatter(|mark, _, _| date_axis_label(mark.value))
        .y_axis_label("Revenue")
        .legend(Legend::default());

    let response = plot.show(ui, |plot_ui| {
        for (location, location_points) in &by_location {
            let line: Vec<[f64; 2]> = location_points
                .iter()
                .map(|p| [date_to_x(p.date), p.forecast])
                .collect();
            plot_ui.line(Line::new(PlotPoints::from(line)).name(*location));

            if show_bounds {
                let lower: Vec<[f64; 2]> = location_points
                    .iter()
                    .filter(|p| p.lower.is_finite())
                    .map(|p| [date_to_x(p.date), p.lower])
                    .collect();
                let upper: Vec<[f64; 2]> = location_points
                    .iter()
                    .filter(|p| p.upper.is_finite())
                    .map(|p| [date_to_x(p.date), p.upper])
                    .collect();
                for bound in [lower, upper] {
                    plot_ui.line(
                        Line::new(PlotPoints::from(bound))
                            .name(format!("{location} (bounds)"))
                            .style(LineStyle::Dashed { length: 6.0 })
                            .color(Color32::from_gray(140)),
                    );
                }
            }
        }
    });
    response.response.hovered()
}

fn forecast_table(ui: &mut Ui, points: &[ForecastPoint]) {
    egui::Grid::new("forecast_table").striped(true).show(ui, |ui| {
        for header in ["Location", "Date", "Forecast", "Lower", "Upper"] {
            ui.label(RichText::new(header).strong());
        }
        ui.end_row();
        for point in points {
            ui.label(&point.location);
            ui.label(point.date.format("%Y-%m-%d").to_string());
            ui.label(format_usd(point.forecast, 2));
            ui.label(format_usd(point.lower, 2));
            ui.label(format_usd(point.upper, 2));
            ui.end_row();
        }
    });
}

/// Category label for a bar at integer x positions; blank elsewhere so
/// fractional grid marks stay unlabeled.
fn bar_label(labels: &[String], x: f64) -> String {
    let rounded = x.round();
    if (x - rounded).abs() > 0.01 || rounded < 0.0 {
        return String::new();
    }
    labels.get(rounded as usize).cloned().unwrap_or_default()
}

fn segment_chart(ui: &mut Ui, counts: &[(Segment, usize)]) -> bool {
    let labels: Vec<String> = counts.iter().map(|(s, _)| s.label().to_string()).collect();
    let bars: Vec<Bar> = counts
        .iter()
        .enumerate()
        .map(|(i, (_, count))| Bar::new(i as f64, *count as f64).width(0.6))
        .collect();

    let response = Plot::new("segments")
        .allow_zoom(false)
        .allow_drag(false)
        .height(260.0)
        .x_axis_formatter(move |mark, _, _| bar_label(&labels, mark.value))
        .y_axis_label("Customers")
        .show(ui, |plot_ui| {
            plot_ui.bar_chart(BarChart::new(bars).name("Segments"));
        });
    response.response.hovered()
}

fn customer_table(ui: &mut Ui, customers: &[Customer]) {
    egui::Grid::new("customer_table").striped(true).show(ui, |ui| {
        for header in [
            "Customer",
            "Email",
            "Days Since Order",
            "Orders",
            "Lifetime Value",
            "Segment",
        ] {
            ui.label(RichText::new(header).strong());
        }
        ui.end_row();
        for customer in customers {
            ui.label(&customer.name);
            ui.label(&customer.email);
            ui.label(customer.recency_days.to_string());
            ui.label(customer.orders.to_string());
            ui.label(format_usd(customer.lifetime_value, 2));
            ui.label(customer.segment.label());
            ui.end_row();
        }
    });
}

fn location_chart(ui: &mut Ui, locations: &[LocationRevenue]) -> bool {
    let labels: Vec<String> = locations.iter().map(|l| l.location.clone()).collect();
    let bars: Vec<Bar> = locations
        .iter()
        .enumerate()
        .map(|(i, l)| Bar::new(i as f64, l.revenue).width(0.6))
        .collect();

    let response = Plot::new("locations")
        .allow_zoom(false)
        .allow_drag(false)
        .height(300.0)
        .x_axis_formatter(move |mark, _, _| bar_label(&labels, mark.value))
        .y_axis_label("Revenue")
        .show(ui, |plot_ui| {
            plot_ui.bar_chart(BarChart::new(bars).name("Revenue"));
        });
    response.response.hovered()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StubSession;

    #[async_trait]
    impl WarehouseSession for StubSession {
        async fn query(&self, _sql: &str) -> Result<RowSet> {
            Ok(RowSet::default())
        }
    }

    fn app() -> DashboardApp {
        DashboardApp::new(
            Arc::new(StubSession),
            "PIZZERIA_DEMO.BELLA_NAPOLI".to_string(),
        )
    }

    #[test]
    fn result_from_another_mode_is_dropped_entirely() {
        let mut app = app();
        app.mode = Mode::Segments;
        app.loading = true;

        // A sentiment fetch finishing after the switch must not stop the
        // spinner for the segments fetch still in flight...
        app.tx
            .send((Mode::Sentiment, Ok(View::Sentiment {
                reviews: Vec::new(),
                summary: None,
            })))
            .unwrap();
        app.check_for_data();
        assert!(app.loading);
        assert!(app.view.is_none());

        // ...and a stale failure must not put its banner over the new view.
        app.tx
            .send((Mode::Sentiment, Err(anyhow::anyhow!("boom"))))
            .unwrap();
        app.check_for_data();
        assert!(app.loading);
        assert!(app.error.is_none());
    }

    #[test]
    fn result_for_the_current_mode_lands_in_the_view() {
        let mut app = app();
        app.mode = Mode::Segments;
        app.loading = true;

        app.tx
            .send((Mode::Segments, Ok(View::Segments(Vec::new()))))
            .unwrap();
        app.check_for_data();
        assert!(!app.loading);
        assert!(matches!(app.view, Some(View::Segments(_))));

        app.loading = true;
        app.tx
            .send((Mode::Segments, Err(anyhow::anyhow!("warehouse down"))))
            .unwrap();
        app.check_for_data();
        assert!(!app.loading);
        assert_eq!(app.error.as_deref(), Some("warehouse down"));
    }

    #[test]
    fn stale_message_does_not_shadow_a_queued_fresh_one() {
        let mut app = app();
        app.mode = Mode::Live;
        app.loading = true;

        app.tx
            .send((Mode::Sentiment, Err(anyhow::anyhow!("stale"))))
            .unwrap();
        app.tx
            .send((Mode::Live, Ok(View::Live {
                today: TodayKpis::default(),
                locations: Vec::new(),
            })))
            .unwrap();
        // One pass drains the channel: the stale message is skipped and the
        // fresh result still lands.
        app.check_for_data();
        assert!(!app.loading);
        assert!(app.error.is_none());
        assert!(matches!(app.view, Some(View::Live { .. })));
    }
}
