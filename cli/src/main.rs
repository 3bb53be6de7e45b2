#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use structopt::StructOpt;

use gtfs::{MergedSchedule, ScheduleQuery, ScheduleRepository, ScheduleTime, StopID, GTFS};
use reconcile::{Merger, RealtimeFeed};

#[derive(StructOpt)]
#[structopt(
    name = "gtfs-reconcile",
    about = "Overlays GTFS-Realtime trip updates onto the static schedule of some stops"
)]
struct Args {
    /// The path to a GTFS directory or .zip file
    #[structopt(long)]
    gtfs: String,
    /// The path to a GTFS-Realtime feed
    #[structopt(long)]
    feed: String,
    /// `protobuf` or `json`. By default, .json files are JSON and anything else is protobuf
    #[structopt(long)]
    feed_format: Option<FeedFormat>,
    /// A stop ID to look up. Repeat for more stops.
    #[structopt(long = "stop", required = true, number_of_values = 1)]
    stops: Vec<String>,
    /// YYYY-MM-DD. Defaults to today in --timezone
    #[structopt(long)]
    date: Option<NaiveDate>,
    #[structopt(long, default_value = "00:00:00")]
    start: ScheduleTime,
    /// Departures at exactly this time are excluded
    #[structopt(long, default_value = "24:00:00")]
    end: ScheduleTime,
    /// The most stop visits to return
    #[structopt(long, default_value = "100")]
    limit: usize,
    /// IANA name, like Asia/Tokyo. Real-time timestamps are shown in this zone.
    #[structopt(long)]
    timezone: Tz,
    #[structopt(long, default_value = "info")]
    log_level: log::LevelFilter,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum FeedFormat {
    Protobuf,
    Json,
}

impl FromStr for FeedFormat {
    type Err = anyhow::Error;

    fn from_str(x: &str) -> Result<Self> {
        match x {
            "protobuf" | "pb" => Ok(FeedFormat::Protobuf),
            "json" => Ok(FeedFormat::Json),
            _ => bail!("Unknown feed format {x}; use protobuf or json"),
        }
    }
}

impl FeedFormat {
    fn guess(path: &Path) -> Self {
        match path.extension().and_then(|x| x.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => FeedFormat::Json,
            _ => FeedFormat::Protobuf,
        }
    }
}

#[derive(Serialize)]
struct Response<T: Serialize> {
    status: bool,
    message: String,
    result: T,
}

impl Args {
    fn run(&self) -> Result<MergedSchedule> {
        let gtfs = self.load_gtfs()?;

        let date = self
            .date
            .unwrap_or_else(|| Utc::now().with_timezone(&self.timezone).date_naive());
        let query = ScheduleQuery::new(self.stops.iter().map(StopID::new), date)
            .window(self.start.clone(), self.end.clone())
            .limit(self.limit);
        let schedule = gtfs.schedule_for_stops(&query)?;

        let feed = self.load_feed()?;
        let merged = Merger::new(self.timezone).merge(&schedule, &feed)?;
        info!(
            "Merged {} trip updates into {} scheduled trips",
            feed.entity_count(),
            merged.len()
        );
        Ok(merged)
    }

    fn load_gtfs(&self) -> Result<GTFS> {
        let path = Path::new(&self.gtfs);
        if path.is_dir() {
            GTFS::load_from_dir(path)
        } else {
            GTFS::load_from_zip(fs_err::File::open(path)?)
        }
    }

    fn load_feed(&self) -> Result<RealtimeFeed> {
        let path = Path::new(&self.feed);
        let format = self.feed_format.unwrap_or_else(|| FeedFormat::guess(path));
        let bytes = fs_err::read(path)?;
        debug!("Read {} bytes of {:?} from {}", bytes.len(), format, path.display());
        match format {
            FeedFormat::Protobuf => reconcile::decode_protobuf(&bytes),
            FeedFormat::Json => reconcile::decode_json(&bytes),
        }
    }
}

fn setup_logging(level: log::LevelFilter) -> Result<()> {
    fern::Dispatch::new()
        .format(|out, msg, record| {
            out.finish(format_args!("[{} {}] {}", record.target(), record.level(), msg))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}

fn print_response<T: Serialize>(status: bool, message: String, result: T) -> Result<()> {
    let response = Response {
        status,
        message,
        result,
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn main() {
    let args = Args::from_args();
    if let Err(err) = setup_logging(args.log_level) {
        eprintln!("Couldn't set up logging: {err}");
    }

    let printed = match args.run() {
        Ok(merged) => print_response(true, "Success".to_string(), merged),
        Err(err) => {
            error!("{err:#}");
            if let Err(err) = print_response(false, format!("{err:#}"), serde_json::Map::new()) {
                eprintln!("{err:#}");
            }
            std::process::exit(1);
        }
    };
    if let Err(err) = printed {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}
