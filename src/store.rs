//! The client store: one aggregate of every portal record, written through to
//! a [`SnapshotStorage`] after each mutation.

use crate::auth;
use crate::models::{
    Alert, Appointment, BloodRequest, BloodType, Donor, MedicineOrder, NewAppointment,
    NewBloodRequest, NewDonor, NewMedicineOrder, OrderStatus, Role, User,
};
use crate::storage::SnapshotStorage;
use anyhow::Result;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_KEY: &str = "bookmycare_data";

/// The persisted aggregate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub current_user: Option<User>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub appointments: Vec<Appointment>,
    #[serde(default)]
    pub donors: Vec<Donor>,
    #[serde(default)]
    pub blood_requests: Vec<BloodRequest>,
    #[serde(default)]
    pub medicines: Vec<MedicineOrder>,
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

/// What `open` found in storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Empty,
    Restored { bytes: usize },
    /// Stored data did not parse and was ignored
    Discarded { error: String },
}

/// Fingerprint of the last snapshot written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReceipt {
    pub seq: u64,
    pub bytes: usize,
    pub sha256: String,
}

pub struct ClientStore<S: SnapshotStorage> {
    state: AppState,
    storage: S,
    key: String,
    last_save: Option<SaveReceipt>,
}

fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn sha256(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

impl<S: SnapshotStorage> ClientStore<S> {
    /// Load the snapshot under `key`, falling back to empty state when it is
    /// missing or malformed. Only a storage read failure is an error.
    pub fn open(storage: S, key: &str) -> Result<(Self, LoadOutcome)> {
        let (state, outcome) = match storage.load(key)? {
            None => (AppState::default(), LoadOutcome::Empty),
            Some(raw) => match serde_json::from_str::<AppState>(&raw) {
                Ok(state) => (state, LoadOutcome::Restored { bytes: raw.len() }),
                Err(e) => (
                    AppState::default(),
                    LoadOutcome::Discarded {
                        error: e.to_string(),
                    },
                ),
            },
        };

        let store = Self {
            state,
            storage,
            key: key.to_string(),
            last_save: None,
        };
        Ok((store, outcome))
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    #[allow(dead_code)]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn current_user(&self) -> Option<&User> {
        self.state.current_user.as_ref()
    }

    pub fn last_save(&self) -> Option<&SaveReceipt> {
        self.last_save.as_ref()
    }

    /// Serialize the whole aggregate and hand it to storage
    fn persist(&mut self) -> Result<()> {
        let snapshot = serde_json::to_string(&self.state)?;
        self.storage.save(&self.key, &snapshot)?;
        let seq = self.last_save.as_ref().map_or(1, |r| r.seq + 1);
        self.last_save = Some(SaveReceipt {
            seq,
            bytes: snapshot.len(),
            sha256: sha256(snapshot.as_bytes()),
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    /// True iff a user with exactly this email exists and the password
    /// verifies. Failure leaves state untouched.
    pub fn login(&mut self, email: &str, password: &str) -> Result<bool> {
        let Some(user) = self
            .state
            .users
            .iter()
            .find(|u| u.email == email && auth::verify_password(password, &u.password_hash))
            .cloned()
        else {
            return Ok(false);
        };
        self.state.current_user = Some(user);
        self.persist()?;
        Ok(true)
    }

    /// False iff the email is already registered
    pub fn signup(
        &mut self,
        name: &str,
        email: &str,
        phone: Option<&str>,
        password: &str,
        role: Role,
    ) -> Result<bool> {
        if self.state.users.iter().any(|u| u.email == email) {
            return Ok(false);
        }
        self.state.users.push(User {
            name: name.to_string(),
            email: email.to_string(),
            password_hash: auth::hash_password(password)?,
            role,
            phone: phone.map(str::to_string),
        });
        self.persist()?;
        Ok(true)
    }

    pub fn logout(&mut self) -> Result<()> {
        self.state.current_user = None;
        self.persist()
    }

    // ------------------------------------------------------------------
    // Record creation
    // ------------------------------------------------------------------

    pub fn add_appointment(&mut self, appointment: NewAppointment) -> Result<Appointment> {
        let record = appointment.into_record(generate_id());
        self.state.appointments.push(record.clone());
        self.persist()?;
        Ok(record)
    }

    pub fn add_donor(&mut self, donor: NewDonor) -> Result<Donor> {
        let record = donor.into_record(generate_id());
        self.state.donors.push(record.clone());
        self.persist()?;
        Ok(record)
    }

    pub fn add_blood_request(&mut self, request: NewBloodRequest) -> Result<BloodRequest> {
        let record = request.into_record(generate_id());
        self.state.blood_requests.push(record.clone());
        self.persist()?;
        Ok(record)
    }

    pub fn add_medicine(&mut self, order: NewMedicineOrder) -> Result<MedicineOrder> {
        let record = order.into_record(generate_id());
        self.state.medicines.push(record.clone());
        self.persist()?;
        Ok(record)
    }

    /// Move an order to `status`. Unknown ids and backward moves change
    /// nothing; the return value says whether the order was updated.
    pub fn update_medicine_status(&mut self, id: &str, status: OrderStatus) -> Result<bool> {
        let Some(order) = self.state.medicines.iter_mut().find(|m| m.id == id) else {
            return Ok(false);
        };
        if status <= order.status {
            return Ok(false);
        }
        order.status = status;
        self.persist()?;
        Ok(true)
    }

    /// Prepend an alert, addressed to `user_email` when given
    pub fn add_alert(&mut self, user_email: Option<&str>, message: &str) -> Result<Alert> {
        let alert = Alert {
            id: generate_id(),
            message: message.to_string(),
            timestamp: Utc::now(),
            user_email: user_email.map(str::to_string),
        };
        self.state.alerts.insert(0, alert.clone());
        self.persist()?;
        Ok(alert)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Donors of exactly `blood` whose area contains `location`, ignoring case
    pub fn get_matching_donors(&self, blood: BloodType, location: &str) -> Vec<&Donor> {
        let needle = location.to_lowercase();
        self.state
            .donors
            .iter()
            .filter(|d| d.blood == blood && d.area.to_lowercase().contains(&needle))
            .collect()
    }

    /// Every appointment on the same hospital, specialty and date
    pub fn get_today_appointments(
        &self,
        hospital: &str,
        specialty: &str,
        date: NaiveDate,
    ) -> Vec<&Appointment> {
        self.state
            .appointments
            .iter()
            .filter(|a| a.hospital == hospital && a.specialty == specialty && a.date == date)
            .collect()
    }

    pub fn appointments_for(&self, email: &str) -> Vec<&Appointment> {
        self.state
            .appointments
            .iter()
            .filter(|a| a.user == email)
            .collect()
    }

    pub fn medicines_for(&self, email: &str) -> Vec<&MedicineOrder> {
        self.state
            .medicines
            .iter()
            .filter(|m| m.user == email)
            .collect()
    }

    pub fn alerts_for(&self, email: &str) -> Vec<&Alert> {
        self.state
            .alerts
            .iter()
            .filter(|a| a.user_email.as_deref() == Some(email))
            .collect()
    }

    /// The last `n` donors registered, newest first
    pub fn donors_recent(&self, n: usize) -> Vec<&Donor> {
        self.state.donors.iter().rev().take(n).collect()
    }

    pub fn medicine(&self, id: &str) -> Option<&MedicineOrder> {
        self.state.medicines.iter().find(|m| m.id == id)
    }
}
