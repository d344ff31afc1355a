//! Portal records and the fixed catalogs the booking forms choose from.
//!
//! Every record serializes in camelCase so a snapshot reads the same way the
//! portal has always stored it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const HOSPITALS: &[&str] = &[
    "Apollo Hospitals",
    "Fortis Healthcare",
    "Max Healthcare",
    "Manipal Hospitals",
    "CARE Hospitals",
    "Medanta - The Medicity",
    "KIMS Hospitals",
    "Yashoda Hospitals",
];

pub const SPECIALTIES: &[&str] = &[
    "Cardiologist",
    "Dentist",
    "Dermatologist",
    "Neurologist",
    "Orthopedic",
    "Pediatrician",
];

/// Account role chosen at signup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Role {
    #[default]
    Patient,
    Doctor,
    Donor,
    Admin,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "patient" => Some(Self::Patient),
            "doctor" => Some(Self::Doctor),
            "donor" => Some(Self::Donor),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patient => "Patient",
            Self::Doctor => "Doctor",
            Self::Donor => "Donor",
            Self::Admin => "Admin",
        }
    }
}

/// The eight ABO/Rh combinations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BloodType {
    #[serde(rename = "A+")]
    APos,
    #[serde(rename = "A-")]
    ANeg,
    #[serde(rename = "B+")]
    BPos,
    #[serde(rename = "B-")]
    BNeg,
    #[serde(rename = "O+")]
    OPos,
    #[serde(rename = "O-")]
    ONeg,
    #[serde(rename = "AB+")]
    AbPos,
    #[serde(rename = "AB-")]
    AbNeg,
}

impl BloodType {
    pub const ALL: [BloodType; 8] = [
        Self::APos,
        Self::ANeg,
        Self::BPos,
        Self::BNeg,
        Self::OPos,
        Self::ONeg,
        Self::AbPos,
        Self::AbNeg,
    ];

    /// Parse the symbol form ("O+", "ab-"); letters are case-insensitive
    pub fn parse(s: &str) -> Option<Self> {
        let wanted = s.trim().to_uppercase();
        Self::ALL.into_iter().find(|b| b.as_str() == wanted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::APos => "A+",
            Self::ANeg => "A-",
            Self::BPos => "B+",
            Self::BNeg => "B-",
            Self::OPos => "O+",
            Self::ONeg => "O-",
            Self::AbPos => "AB+",
            Self::AbNeg => "AB-",
        }
    }
}

impl std::fmt::Display for BloodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AppointmentStatus {
    #[default]
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "Confirmed",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }
}

/// Lifecycle of a medicine order. Variants are declared in lifecycle order,
/// so `Ord` gives the forward direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    #[serde(rename = "Pending Verification")]
    PendingVerification,
    #[serde(rename = "Verified - Out for Delivery")]
    OutForDelivery,
    #[serde(rename = "Delivered")]
    Delivered,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingVerification => "Pending Verification",
            Self::OutForDelivery => "Verified - Out for Delivery",
            Self::Delivered => "Delivered",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeliveryWindow {
    #[serde(rename = "Morning (9 AM - 12 PM)")]
    Morning,
    #[serde(rename = "Afternoon (12 PM - 3 PM)")]
    Afternoon,
    #[serde(rename = "Evening (3 PM - 6 PM)")]
    Evening,
    #[default]
    #[serde(rename = "Anytime")]
    Anytime,
}

impl DeliveryWindow {
    pub const ALL: [DeliveryWindow; 4] = [Self::Morning, Self::Afternoon, Self::Evening, Self::Anytime];

    /// Accepts the short name ("morning") or the full label
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.trim().to_lowercase();
        Self::ALL.into_iter().find(|w| {
            let label = w.as_str().to_lowercase();
            label == lower || label.split_whitespace().next() == Some(lower.as_str())
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Morning => "Morning (9 AM - 12 PM)",
            Self::Afternoon => "Afternoon (12 PM - 3 PM)",
            Self::Evening => "Evening (3 PM - 6 PM)",
            Self::Anytime => "Anytime",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub name: String,
    pub email: String,
    /// argon2 PHC string
    pub password_hash: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub name: String,
    pub hospital: String,
    pub specialty: String,
    pub date: NaiveDate,
    pub appointment_number: String,
    pub contact: String,
    pub user: String,
    pub status: AppointmentStatus,
    pub reminder_sent: bool,
    pub final_reminder_sent: bool,
    pub booked_at: DateTime<Utc>,
}

/// An appointment before the store assigns its id
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub name: String,
    pub hospital: String,
    pub specialty: String,
    pub date: NaiveDate,
    pub appointment_number: String,
    pub contact: String,
    pub user: String,
    pub status: AppointmentStatus,
    pub booked_at: DateTime<Utc>,
}

impl NewAppointment {
    pub fn into_record(self, id: String) -> Appointment {
        Appointment {
            id,
            name: self.name,
            hospital: self.hospital,
            specialty: self.specialty,
            date: self.date,
            appointment_number: self.appointment_number,
            contact: self.contact,
            user: self.user,
            status: self.status,
            reminder_sent: false,
            final_reminder_sent: false,
            booked_at: self.booked_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Donor {
    pub id: String,
    pub name: String,
    pub blood: BloodType,
    pub age: u8,
    pub contact: String,
    pub area: String,
    pub user: String,
    pub registered: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDonor {
    pub name: String,
    pub blood: BloodType,
    pub age: u8,
    pub contact: String,
    pub area: String,
    pub user: String,
    pub registered: DateTime<Utc>,
}

impl NewDonor {
    pub fn into_record(self, id: String) -> Donor {
        Donor {
            id,
            name: self.name,
            blood: self.blood,
            age: self.age,
            contact: self.contact,
            area: self.area,
            user: self.user,
            registered: self.registered,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BloodRequest {
    pub id: String,
    pub name: String,
    pub blood: BloodType,
    pub hospital: String,
    pub location: String,
    pub contact: String,
    pub user: String,
    pub requested: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBloodRequest {
    pub name: String,
    pub blood: BloodType,
    pub hospital: String,
    pub location: String,
    pub contact: String,
    pub user: String,
    pub requested: DateTime<Utc>,
}

impl NewBloodRequest {
    pub fn into_record(self, id: String) -> BloodRequest {
        BloodRequest {
            id,
            name: self.name,
            blood: self.blood,
            hospital: self.hospital,
            location: self.location,
            contact: self.contact,
            user: self.user,
            requested: self.requested,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicineOrder {
    pub id: String,
    pub name: String,
    /// Name of the uploaded prescription; the content is never kept
    pub file: String,
    pub address: String,
    pub contact: String,
    pub time: DeliveryWindow,
    pub user: String,
    pub status: OrderStatus,
    pub ordered: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMedicineOrder {
    pub name: String,
    pub file: String,
    pub address: String,
    pub contact: String,
    pub time: DeliveryWindow,
    pub user: String,
    pub status: OrderStatus,
    pub ordered: DateTime<Utc>,
}

impl NewMedicineOrder {
    pub fn into_record(self, id: String) -> MedicineOrder {
        MedicineOrder {
            id,
            name: self.name,
            file: self.file,
            address: self.address,
            contact: self.contact,
            time: self.time,
            user: self.user,
            status: self.status,
            ordered: self.ordered,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
}

/// Returns the catalog entry matching `s` ignoring case
pub fn catalog_lookup(catalog: &[&'static str], s: &str) -> Option<&'static str> {
    let wanted = s.trim();
    catalog
        .iter()
        .copied()
        .find(|entry| entry.eq_ignore_ascii_case(wanted))
}
