//! Community resource directory and the daily mobile clinic schedule.
//!
//! Both lists are fixed catalogues shipped with the app; nothing here is
//! persisted.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ResourceError;
use crate::map::PinStore;
use crate::types::{Pin, PinFilters, PinType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Resource {
    fn new(id: &str, title: &str, description: &str, tags: &[&str], category: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            category: category.to_string(),
            location: None,
        }
    }

    fn at(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }
}

pub fn resource_catalogue() -> Vec<Resource> {
    vec![
        Resource::new(
            "1",
            "Policy Updates",
            "Latest updates on housing and assistance policies",
            &["Policy", "Updates"],
            "Information",
        ),
        Resource::new(
            "2",
            "Housing Search",
            "Tools and resources for finding housing",
            &["Housing", "Search"],
            "Tools",
        ),
        Resource::new(
            "3",
            "Getting Phone Access",
            "Information on free and low-cost phone services",
            &["Phone", "Communication"],
            "Information",
        ),
        Resource::new(
            "4",
            "Day Center",
            "Drop-in center with showers, meals, and case management",
            &["No Wait List", "Same Day"],
            "Day Centers",
        )
        .at("Downtown"),
        Resource::new(
            "5",
            "Imperial Street Shelter",
            "90-day housing program with on-site support services",
            &["Application Required"],
            "Shelters/transitional housing",
        )
        .at("Imperial Street"),
        Resource::new(
            "6",
            "Housing First Program",
            "Permanent supportive housing opportunities",
            &["Application Required", "Case Manager Referral"],
            "Permanent housing",
        ),
        Resource::new(
            "7",
            "Central Library Resources",
            "Computer access, job search assistance, and resource navigation",
            &["Walk-in Welcome"],
            "Information",
        )
        .at("Downtown"),
        Resource::new(
            "8",
            "Old Town Station Mobile Clinic",
            "Free healthcare services available Tuesday and Thursday",
            &["No Insurance Required", "Walk-in Welcome"],
            "Health",
        )
        .at("Old Town Station"),
        Resource::new(
            "9",
            "Community Food Bank",
            "Weekly food distribution at multiple locations",
            &["No ID Required", "Walk-in Welcome"],
            "Food",
        )
        .at("Multiple Locations"),
    ]
}

/// Topic checkboxes of the resource filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Emergency,
    DayCenters,
    Shelters,
    Permanent,
    Health,
    Hazards,
}

impl Topic {
    pub const ALL: [Topic; 6] = [
        Topic::Emergency,
        Topic::DayCenters,
        Topic::Shelters,
        Topic::Permanent,
        Topic::Health,
        Topic::Hazards,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Topic::Emergency => "emergency",
            Topic::DayCenters => "daycenters",
            Topic::Shelters => "shelters",
            Topic::Permanent => "permanent",
            Topic::Health => "health",
            Topic::Hazards => "hazards",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Topic::Emergency => "Emergency services",
            Topic::DayCenters => "Day Centers",
            Topic::Shelters => "Shelters/transitional housing",
            Topic::Permanent => "Permanent housing",
            Topic::Health => "Health",
            Topic::Hazards => "Hazards",
        }
    }

    /// Resource category this topic selects. Emergency services has no
    /// catalogue category yet, so it matches nothing.
    fn category(&self) -> Option<&'static str> {
        match self {
            Topic::Emergency => None,
            other => Some(other.label()),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Topic {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|t| t.id() == s)
            .ok_or_else(|| ResourceError::UnknownTopic(s.to_string()))
    }
}

/// Location checkboxes of the resource filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationFilter {
    Imperial,
    Nearby,
}

impl LocationFilter {
    pub const ALL: [LocationFilter; 2] = [LocationFilter::Imperial, LocationFilter::Nearby];

    pub fn id(&self) -> &'static str {
        match self {
            LocationFilter::Imperial => "imperial",
            LocationFilter::Nearby => "nearby",
        }
    }

    /// Also the exact `location` value a resource must carry to match.
    pub fn label(&self) -> &'static str {
        match self {
            LocationFilter::Imperial => "Imperial Street",
            LocationFilter::Nearby => "Near my location",
        }
    }
}

impl fmt::Display for LocationFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for LocationFilter {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LocationFilter::ALL
            .into_iter()
            .find(|l| l.id() == s)
            .ok_or_else(|| ResourceError::UnknownLocation(s.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceFilters {
    pub search: String,
    pub topics: Vec<Topic>,
    pub locations: Vec<LocationFilter>,
}

impl ResourceFilters {
    /// Add the topic if absent, remove it if present.
    pub fn toggle_topic(&mut self, topic: Topic) {
        if let Some(i) = self.topics.iter().position(|t| *t == topic) {
            self.topics.remove(i);
        } else {
            self.topics.push(topic);
        }
    }

    pub fn toggle_location(&mut self, location: LocationFilter) {
        if let Some(i) = self.locations.iter().position(|l| *l == location) {
            self.locations.remove(i);
        } else {
            self.locations.push(location);
        }
    }
}

/// Resources passing every active criterion, in catalogue order.
///
/// The search term matches title or description case-insensitively. Topics
/// and locations each match if any selected entry matches; an empty
/// selection does not filter.
pub fn filter_resources(resources: &[Resource], filters: &ResourceFilters) -> Vec<Resource> {
    let needle = filters.search.to_lowercase();
    resources
        .iter()
        .filter(|r| {
            needle.is_empty()
                || r.title.to_lowercase().contains(&needle)
                || r.description.to_lowercase().contains(&needle)
        })
        .filter(|r| {
            filters.topics.is_empty()
                || filters
                    .topics
                    .iter()
                    .any(|t| t.category() == Some(r.category.as_str()))
        })
        .filter(|r| {
            filters.locations.is_empty()
                || filters
                    .locations
                    .iter()
                    .any(|l| r.location.as_deref() == Some(l.label()))
        })
        .cloned()
        .collect()
}

/// One stop of today's mobile clinic route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledClinic {
    pub id: String,
    pub name: String,
    pub location: String,
    pub hours: String,
    pub services: Vec<String>,
    /// Whether the clinic reports its position on the map.
    pub tracking: bool,
}

impl ScheduledClinic {
    fn new(id: &str, name: &str, location: &str, hours: &str, services: &[&str], tracking: bool) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            location: location.to_string(),
            hours: hours.to_string(),
            services: services.iter().map(|s| s.to_string()).collect(),
            tracking,
        }
    }

    /// The mobile clinic pin whose name contains this clinic's first word.
    pub fn find_pin<'a>(&self, pins: &'a [Pin]) -> Option<&'a Pin> {
        let first_word = self.name.split(' ').next().unwrap_or_default();
        pins.iter()
            .find(|p| p.pin_type == PinType::MobileClinic && p.name.contains(first_word))
    }

    /// Select this clinic's pin in `store`, if it has one.
    pub fn focus(&self, store: &PinStore) -> Option<Pin> {
        let clinics = store.filter(&PinFilters::by_type(PinType::MobileClinic));
        let pin = self.find_pin(&clinics)?;
        log::debug!("Focusing {} on pin {}", self.name, pin.id);
        store.select(Some(pin.id.as_str()))
    }
}

pub fn clinic_schedule() -> Vec<ScheduledClinic> {
    vec![
        ScheduledClinic::new(
            "clinic-1",
            "Imperial Street Clinic",
            "Imperial Ave & 30th St",
            "10:00 AM - 2:00 PM",
            &["Vaccinations", "Health Screenings", "Basic Care"],
            true,
        ),
        ScheduledClinic::new(
            "clinic-2",
            "Downtown Mobile Unit",
            "Civic Center Plaza",
            "9:00 AM - 12:00 PM",
            &["STI Testing", "Mental Health", "Consultations"],
            false,
        ),
        ScheduledClinic::new(
            "clinic-3",
            "East Village Outreach",
            "Market St & 14th St",
            "1:00 PM - 5:00 PM",
            &["Blood Pressure", "Diabetes Screening", "Counseling"],
            false,
        ),
    ]
}
