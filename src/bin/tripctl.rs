//! Command-line client for the trip planner API.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use tracing::Subscriber;
use tracing_subscriber::{
    fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};
use tripplanner::client::{
    calendar::{self, month_grid},
    dashboard::{collect_alerts, DashboardSummary},
    detail::{load_schedule_alerts, load_trip_detail, load_trip_weather},
    token::TokenStore,
    ApiClient, ClientError,
};
use tripplanner::models::{
    budget::ExpenseCreate,
    event::{EventCreate, EventUpdate},
    trip::{Trip, TripCreate},
    user::UserCreate,
};

/// Plan trips, budgets and itineraries from the terminal
#[derive(Parser, Debug)]
#[command(name = "tripctl", about = "Trip planner command-line client", long_about = None)]
struct Args {
    /// Base URL of the trip planner API
    #[arg(long, env = "TRIPCTL_API_URL", default_value = "http://127.0.0.1:8000")]
    api_url: String,

    /// Where the login token is kept
    #[arg(long, env = "TRIPCTL_TOKEN_FILE", default_value = ".tripctl-token")]
    token_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Log in with email or username
    Login {
        identifier: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    /// Show the logged-in account
    Whoami,
    /// Trip counts, next trip and recent alerts
    Dashboard,
    /// List trips
    Trips,
    CreateTrip {
        #[arg(long)]
        name: String,
        #[arg(long)]
        destination: String,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(long, default_value_t = 0.0)]
        budget: f64,
        #[arg(long, default_value = "USD")]
        currency: String,
        #[arg(long, default_value_t = 1)]
        party_size: i64,
        #[arg(long, default_value = "balanced")]
        price_sensitivity: String,
        #[arg(long, default_value = "balanced")]
        trip_type: String,
    },
    DeleteTrip { trip_id: i64 },
    /// Overview, destinations, itinerary and budget of one trip
    Show { trip_id: i64 },
    /// Month view of all trips
    Calendar {
        /// Month as YYYY-MM, defaults to the current month
        #[arg(long)]
        month: Option<String>,
    },
    /// Live forecast with risk scores
    Weather { trip_id: i64 },
    /// Stored weather alerts, for one trip or the first few
    Alerts {
        #[arg(long)]
        trip: Option<i64>,
    },
    /// Events at risk from the forecast, with suggested dates
    Schedule { trip_id: i64 },
    /// Move an event to a suggested date
    ApplySuggestion { event_id: i64, date: NaiveDate },
    AddEvent {
        trip_id: i64,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        title: String,
        #[arg(long = "type", default_value = "activity")]
        kind: String,
        #[arg(long)]
        start: Option<NaiveTime>,
        #[arg(long)]
        end: Option<NaiveTime>,
        #[arg(long)]
        cost: Option<f64>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    AddExpense {
        trip_id: i64,
        #[arg(long)]
        description: String,
        #[arg(long)]
        amount: f64,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        envelope: Option<i64>,
        #[arg(long)]
        event: Option<i64>,
        #[arg(long, default_value = "USD")]
        currency: String,
    },
    /// Reapply the default envelope allocation
    Recalculate { trip_id: i64 },
    /// Save the printable itinerary
    Export {
        trip_id: i64,
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();
    let store = TokenStore::new(&args.token_file);
    let mut client = ApiClient::new(&args.api_url)?;
    client.set_token(store.load().await?);

    match run(&client, &store, args.command).await {
        Err(err) if is_unauthorized(&err) => {
            store.clear().await?;
            bail!("Your session has expired. Run `tripctl login` again.");
        }
        other => other,
    }
}

fn log_subscriber<W>(writer: W) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter_layer = EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(writer);
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
}

/// Diagnostics go to stderr so command output stays pipeable.
fn init_logging() {
    log_subscriber(std::io::stderr).init();
}

fn is_unauthorized(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ClientError>()
        .is_some_and(ClientError::is_unauthorized)
}

fn require_login(client: &ApiClient) -> Result<()> {
    if client.token().is_none() {
        bail!("Not logged in. Run `tripctl login` first.");
    }
    Ok(())
}

fn print_trip(trip: &Trip) {
    println!(
        "#{:<4} {:<28} {:<18} {} .. {}  {:.2} {}",
        trip.id,
        trip.name,
        trip.destination,
        trip.start_date,
        trip.end_date,
        trip.total_budget,
        trip.currency
    );
}

async fn login(client: &ApiClient, store: &TokenStore, identifier: &str, password: &str) -> Result<()> {
    let token = match client.login(identifier, password).await {
        Ok(token) => token,
        Err(ClientError::Unauthorized) => bail!("Invalid credentials."),
        Err(err) => return Err(err.into()),
    };
    store.save(&token.access_token).await?;
    Ok(())
}

/// Clears the local token even when the server no longer knows it.
async fn logout(client: &ApiClient, store: &TokenStore) -> Result<()> {
    if client.token().is_some() {
        match client.logout().await {
            Ok(()) | Err(ClientError::Unauthorized) => {}
            Err(err) => return Err(err.into()),
        }
    }
    store.clear().await?;
    Ok(())
}

async fn run(client: &ApiClient, store: &TokenStore, command: Command) -> Result<()> {
    match command {
        Command::Register {
            email,
            username,
            password,
        } => {
            let user = client
                .register(&UserCreate {
                    email,
                    username,
                    password,
                })
                .await?;
            println!("Registered {} <{}>", user.username, user.email);
        }
        Command::Login {
            identifier,
            password,
        } => {
            login(client, store, &identifier, &password).await?;
            println!("Logged in as {identifier}");
        }
        Command::Logout => {
            logout(client, store).await?;
            println!("Logged out");
        }
        Command::Whoami => {
            require_login(client)?;
            let me = client.me().await?;
            println!("{} <{}> (id {})", me.username, me.email, me.id);
        }
        Command::Dashboard => {
            require_login(client)?;
            let trips = client.list_trips().await?;
            let summary = DashboardSummary::from_trips(&trips, Local::now().date_naive());
            println!(
                "Trips: {} total, {} upcoming, {} past",
                summary.total, summary.upcoming, summary.past
            );
            match &summary.next_trip {
                Some(trip) => println!(
                    "Next trip: {} to {} on {}",
                    trip.name, trip.destination, trip.start_date
                ),
                None => println!("No upcoming trips"),
            }
            let alerts = collect_alerts(client, &trips).await;
            if !alerts.is_empty() {
                println!("\nAlerts:");
                for item in alerts {
                    println!(
                        "  {} [{}] {}: {}",
                        item.alert.date, item.alert.severity, item.trip_name, item.alert.summary
                    );
                }
            }
        }
        Command::Trips => {
            require_login(client)?;
            let trips = client.list_trips().await?;
            if trips.is_empty() {
                println!("No trips yet");
            }
            trips.iter().for_each(print_trip);
        }
        Command::CreateTrip {
            name,
            destination,
            start,
            end,
            budget,
            currency,
            party_size,
            price_sensitivity,
            trip_type,
        } => {
            require_login(client)?;
            let trip = client
                .create_trip(&TripCreate {
                    owner_id: None,
                    name,
                    destination,
                    start_date: start,
                    end_date: end,
                    total_budget: budget,
                    currency,
                    party_size,
                    price_sensitivity,
                    trip_type,
                })
                .await?;
            print_trip(&trip);
        }
        Command::DeleteTrip { trip_id } => {
            require_login(client)?;
            client.delete_trip(trip_id).await?;
            println!("Deleted trip #{trip_id}");
        }
        Command::Show { trip_id } => {
            require_login(client)?;
            let detail = load_trip_detail(client, trip_id).await?;
            let trip = &detail.trip;
            println!("{} ({})", trip.name, trip.destination);
            println!(
                "{} .. {}, {} traveller(s), {} / {}",
                trip.start_date, trip.end_date, trip.party_size, trip.price_sensitivity, trip.trip_type
            );
            println!(
                "Planned {:.2} {cur}, spent {:.2} {cur}, {} event(s)",
                detail.planned_total(),
                detail.actual_total(),
                detail.event_count(),
                cur = trip.currency
            );
            if let Some(message) = detail.partial_message() {
                let failed: Vec<&str> = detail.failed_sections().iter().map(|s| s.label()).collect();
                println!("! {message} ({})", failed.join(", "));
            }

            if !detail.destinations.is_empty() {
                println!("\nDestinations:");
                for stop in &detail.destinations {
                    println!(
                        "  {}. {} ({})",
                        stop.sort_order + 1,
                        stop.location.name,
                        stop.location.kind
                    );
                }
            }

            println!("\nItinerary:");
            for day in detail.itinerary() {
                println!("  {}", day.date.format("%a %Y-%m-%d"));
                for event in &day.events {
                    let time = event
                        .start_time
                        .map(|t| t.format("%H:%M").to_string())
                        .unwrap_or_else(|| "--:--".into());
                    println!("    {time}  {} [{}] #{}", event.title, event.kind, event.id);
                }
            }

            if let Some(budget) = &detail.budget {
                println!("\nBudget:");
                for row in &budget.envelopes {
                    println!(
                        "  {:<12} {:>9.2} planned {:>9.2} spent {:>5.0}%",
                        row.envelope.category,
                        row.envelope.planned_amount,
                        row.actual_spent,
                        row.percent_used
                    );
                }
                println!(
                    "  remaining {:.2}, about {:.2} per day",
                    budget.remaining_total, budget.recommended_daily_spend
                );
            }
        }
        Command::Calendar { month } => {
            require_login(client)?;
            let month = match month {
                Some(raw) => calendar::parse_month(&raw)
                    .with_context(|| format!("invalid month '{raw}', expected YYYY-MM"))?,
                None => Local::now().date_naive(),
            };
            let trips = client.list_trips().await?;
            let cells = month_grid(month, &trips);
            println!("{}", month.format("%B %Y"));
            println!(" Sun  Mon  Tue  Wed  Thu  Fri  Sat");
            for week in cells.chunks(7) {
                let line: Vec<String> = week
                    .iter()
                    .map(|cell| {
                        let marker = if cell.trips.is_empty() { ' ' } else { '*' };
                        if cell.in_month {
                            format!(" {:>2}{marker} ", cell.date.format("%d"))
                        } else {
                            "     ".to_string()
                        }
                    })
                    .collect();
                println!("{}", line.concat());
            }
            for trip in trips.iter().filter(|trip| cells.iter().any(|c| c.in_month && c.trips.contains(trip))) {
                print_trip(trip);
            }
        }
        Command::Weather { trip_id } => {
            require_login(client)?;
            let weather = load_trip_weather(client, trip_id).await?;
            println!(
                "{}: {} .. {}",
                weather.city, weather.start_date, weather.end_date
            );
            if weather.days.is_empty() {
                println!("No forecast available for these dates");
            }
            for day in &weather.days {
                println!(
                    "  {} {:>5.1}/{:<5.1} {:>3}% {:<7} risk {:>3} ({}) {}",
                    day.date,
                    day.temp_max,
                    day.temp_min,
                    day.precip_prob,
                    day.summary,
                    day.risk_score,
                    day.risk_category,
                    day.advice
                );
            }
        }
        Command::Alerts { trip } => {
            require_login(client)?;
            match trip {
                Some(trip_id) => {
                    for alert in client.trip_alerts(trip_id).await? {
                        println!(
                            "  {} [{}] {} {}",
                            alert.date,
                            alert.severity,
                            alert.summary,
                            alert.contributing_factors.join(", ")
                        );
                    }
                }
                None => {
                    let trips = client.list_trips().await?;
                    for item in collect_alerts(client, &trips).await {
                        println!(
                            "  {} [{}] {}: {}",
                            item.alert.date, item.alert.severity, item.trip_name, item.alert.summary
                        );
                    }
                }
            }
        }
        Command::Schedule { trip_id } => {
            require_login(client)?;
            let impacts = load_schedule_alerts(client, trip_id).await?;
            if impacts.is_empty() {
                println!("No events at risk");
            }
            for impact in impacts {
                let suggestion = impact
                    .suggested_date
                    .map(|date| format!("try {date}"))
                    .unwrap_or_else(|| "no safer day found".into());
                println!(
                    "  #{} {} on {}: {} [{}], {}",
                    impact.event.id,
                    impact.event.title,
                    impact.event.date,
                    impact.reason,
                    impact.factors.join(", "),
                    suggestion
                );
            }
        }
        Command::ApplySuggestion { event_id, date } => {
            require_login(client)?;
            let event = client
                .update_event(event_id, &EventUpdate::reschedule(date))
                .await?;
            println!("Moved '{}' to {}", event.title, event.date);
        }
        Command::AddEvent {
            trip_id,
            date,
            title,
            kind,
            start,
            end,
            cost,
            category,
            notes,
        } => {
            require_login(client)?;
            let event = client
                .create_event(
                    trip_id,
                    &EventCreate {
                        trip_id,
                        location_id: None,
                        date,
                        start_time: start,
                        end_time: end,
                        title,
                        kind,
                        cost,
                        notes,
                        category_type: category,
                        is_refundable: None,
                        reservation_link: None,
                    },
                )
                .await?;
            println!("Added event #{} on {}", event.id, event.date);
        }
        Command::AddExpense {
            trip_id,
            description,
            amount,
            date,
            envelope,
            event,
            currency,
        } => {
            require_login(client)?;
            let expense = client
                .create_expense(
                    trip_id,
                    &ExpenseCreate {
                        trip_id,
                        envelope_id: envelope,
                        event_id: event,
                        description,
                        amount,
                        currency,
                        spent_at_date: date,
                    },
                )
                .await?;
            println!(
                "Recorded expense #{}: {:.2} {}",
                expense.id, expense.amount, expense.currency
            );
        }
        Command::Recalculate { trip_id } => {
            require_login(client)?;
            for envelope in client.recalculate_budget(trip_id).await? {
                println!("  {:<12} {:>9.2}", envelope.category, envelope.planned_amount);
            }
        }
        Command::Export { trip_id, output } => {
            require_login(client)?;
            let html = client.export_trip(trip_id).await?;
            tokio::fs::write(&output, html)
                .await
                .with_context(|| format!("writing {}", output.display()))?;
            println!("Saved itinerary to {}", output.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    async fn respond(server: &MockServer, verb: &str, route: &str, status: u16, body: serde_json::Value) {
        Mock::given(method(verb))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn wrong_password_is_not_an_expired_session() {
        let server = MockServer::start().await;
        respond(&server, "POST", "/auth/login", 401, json!({ "detail": "Could not validate credentials" })).await;
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("token"));
        let client = ApiClient::new(&server.uri()).unwrap();

        let err = login(&client, &store, "ana", "nope").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid credentials.");
        assert!(!is_unauthorized(&err));
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn logout_with_stale_token_still_clears_it() {
        let server = MockServer::start().await;
        respond(&server, "POST", "/auth/logout", 401, json!({ "detail": "Could not validate credentials" })).await;
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("token"));
        store.save("stale").await.unwrap();
        let client = ApiClient::new(&server.uri()).unwrap().with_token("stale");

        logout(&client, &store).await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn failed_sections_are_logged() {
        let server = MockServer::start().await;
        respond(
            &server,
            "GET",
            "/trips/5",
            200,
            json!({
                "id": 5, "owner_id": 1, "name": "Alps", "destination": "Zermatt",
                "start_date": "2026-07-10", "end_date": "2026-07-12",
                "total_budget": 900.0, "currency": "CHF", "party_size": 2,
                "price_sensitivity": "balanced", "trip_type": "hiking"
            }),
        )
        .await;
        let captured = Captured::default();
        let writer = captured.clone();
        let _guard = tracing::subscriber::set_default(log_subscriber(move || writer.clone()));

        let client = ApiClient::new(&server.uri()).unwrap().with_token("t");
        let detail = load_trip_detail(&client, 5).await.unwrap();
        assert!(detail.is_partial());

        let logged = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("section failed to load"), "{logged}");
        assert!(logged.contains("WARN"), "{logged}");
    }
}
