use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Deserializer, Serialize};

use super::ServiceID;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Calendar {
    pub services: BTreeMap<ServiceID, Service>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Service {
    pub service_id: ServiceID,
    pub days_of_week: DaysOfWeek,
    /// None for services defined only by calendar_dates.txt
    pub date_range: Option<(NaiveDate, NaiveDate)>,

    pub extra_days: BTreeSet<NaiveDate>,
    pub removed_days: BTreeSet<NaiveDate>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DaysOfWeek {
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub sunday: bool,
}

impl Calendar {
    pub fn services_on(&self, day: NaiveDate) -> BTreeSet<&ServiceID> {
        self.services
            .values()
            .filter(|service| service.runs_on(day))
            .map(|service| &service.service_id)
            .collect()
    }
}

impl Service {
    /// Exceptions win over the weekly pattern: an added date always runs, a removed date never
    /// does.
    pub fn runs_on(&self, day: NaiveDate) -> bool {
        if self.extra_days.contains(&day) {
            return true;
        }
        if self.removed_days.contains(&day) {
            return false;
        }
        match self.date_range {
            Some((start, end)) => day >= start && day <= end && self.days_of_week.includes(day),
            None => false,
        }
    }

    fn exceptions_only(service_id: ServiceID) -> Self {
        Self {
            service_id,
            days_of_week: DaysOfWeek::default(),
            date_range: None,
            extra_days: BTreeSet::new(),
            removed_days: BTreeSet::new(),
        }
    }
}

impl DaysOfWeek {
    pub fn includes(&self, day: NaiveDate) -> bool {
        match day.weekday() {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        }
    }
}

pub fn load<R: std::io::Read>(reader: R) -> Result<Calendar> {
    let mut calendar = Calendar::default();
    for rec in csv::Reader::from_reader(reader).deserialize() {
        let rec: Record = rec?;
        if calendar.services.contains_key(&rec.service_id) {
            bail!("Duplicate {:?}", rec.service_id);
        }
        let start_date = parse_date(&rec.start_date)?;
        let end_date = parse_date(&rec.end_date)?;
        calendar.services.insert(
            rec.service_id.clone(),
            Service {
                service_id: rec.service_id,
                days_of_week: DaysOfWeek {
                    monday: rec.monday,
                    tuesday: rec.tuesday,
                    wednesday: rec.wednesday,
                    thursday: rec.thursday,
                    friday: rec.friday,
                    saturday: rec.saturday,
                    sunday: rec.sunday,
                },
                date_range: Some((start_date, end_date)),

                extra_days: BTreeSet::new(),
                removed_days: BTreeSet::new(),
            },
        );
    }
    Ok(calendar)
}

pub fn load_exceptions<R: std::io::Read>(calendar: &mut Calendar, reader: R) -> Result<()> {
    for rec in csv::Reader::from_reader(reader).deserialize() {
        let rec: DateRecord = rec?;
        let date = parse_date(&rec.date)?;
        let service = calendar
            .services
            .entry(rec.service_id.clone())
            .or_insert_with(|| {
                debug!("{:?} is only defined by exceptions", rec.service_id);
                Service::exceptions_only(rec.service_id.clone())
            });
        match rec.exception_type {
            1 => {
                service.extra_days.insert(date);
            }
            2 => {
                service.removed_days.insert(date);
            }
            x => bail!("Unknown exception_type {x} for {:?}", rec.service_id),
        }
    }
    Ok(())
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y%m%d").map_err(|err| anyhow!("Bad date {raw:?}: {err}"))
}

#[derive(Deserialize)]
struct Record {
    service_id: ServiceID,
    #[serde(deserialize_with = "parse_bool")]
    monday: bool,
    #[serde(deserialize_with = "parse_bool")]
    tuesday: bool,
    #[serde(deserialize_with = "parse_bool")]
    wednesday: bool,
    #[serde(deserialize_with = "parse_bool")]
    thursday: bool,
    #[serde(deserialize_with = "parse_bool")]
    friday: bool,
    #[serde(deserialize_with = "parse_bool")]
    saturday: bool,
    #[serde(deserialize_with = "parse_bool")]
    sunday: bool,
    start_date: String,
    end_date: String,
}

fn parse_bool<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    let n = <u8>::deserialize(d)?;
    if n == 1 {
        return Ok(true);
    }
    if n == 0 {
        return Ok(false);
    }
    Err(serde::de::Error::custom(format!("Unknown bool value {n}")))
}

#[derive(Deserialize)]
struct DateRecord {
    service_id: ServiceID,
    date: String,
    exception_type: u8,
}
