//! Portal flows: what each form submission does to the store.
//!
//! Flows validate raw form input, apply the business rules (queue capacity,
//! donor matching, deferred verification) and record alerts for the signed-in
//! user. User-facing failures come back as a [`Notice`] inside the
//! `anyhow::Error`; callers tell them apart with `downcast_ref::<Notice>()`.

use crate::config::Config;
use crate::models::{
    catalog_lookup, Appointment, AppointmentStatus, BloodType, DeliveryWindow, Donor,
    MedicineOrder, NewAppointment, NewBloodRequest, NewDonor, NewMedicineOrder, OrderStatus, Role,
    User, HOSPITALS, SPECIALTIES,
};
use crate::scheduler::{PendingVerification, VerificationScheduler};
use crate::storage::SnapshotStorage;
use crate::store::ClientStore;
use crate::validation::{self, Notice};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};

/// Top-level views of the portal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Home,
    Appointments,
    Blood,
    Medicine,
    Alerts,
}

impl Tab {
    pub const ALL: [Tab; 5] = [
        Self::Home,
        Self::Appointments,
        Self::Blood,
        Self::Medicine,
        Self::Alerts,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "home" => Some(Self::Home),
            "appointments" | "appointment" => Some(Self::Appointments),
            "blood" => Some(Self::Blood),
            "medicine" | "medicines" => Some(Self::Medicine),
            "alerts" => Some(Self::Alerts),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Appointments => "appointments",
            Self::Blood => "blood",
            Self::Medicine => "medicine",
            Self::Alerts => "alerts",
        }
    }

    pub fn requires_login(&self) -> bool {
        *self != Self::Home
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignupForm {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub confirm_password: String,
    pub role: String,
}

#[derive(Debug, Clone, Default)]
pub struct AppointmentForm {
    pub patient_name: String,
    pub hospital: String,
    pub specialty: String,
    pub date: String,
    pub contact: String,
}

#[derive(Debug, Clone, Default)]
pub struct QueueForm {
    pub hospital: String,
    pub specialty: String,
    pub date: String,
}

#[derive(Debug, Clone, Default)]
pub struct DonorForm {
    pub name: String,
    pub blood: String,
    pub age: String,
    pub contact: String,
    pub area: String,
}

#[derive(Debug, Clone, Default)]
pub struct BloodRequestForm {
    pub patient_name: String,
    pub blood: String,
    pub hospital: String,
    pub location: String,
    pub contact: String,
}

#[derive(Debug, Clone, Default)]
pub struct MedicineForm {
    pub patient_name: String,
    pub prescription_file: String,
    pub address: String,
    pub contact: String,
    /// Blank means "Anytime"
    pub delivery_time: String,
}

/// Queue position for one hospital, specialty and date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueInfo {
    pub count: usize,
    pub completed: usize,
    pub waiting: usize,
    pub full: bool,
    pub next_number: usize,
    pub estimated_wait_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingOutcome {
    Confirmed(Appointment),
    /// The queue was full; nothing was booked
    Waitlisted {
        hospital: String,
        specialty: String,
        date: NaiveDate,
    },
}

#[derive(Debug, Clone)]
pub struct BloodRequestOutcome {
    pub request_id: String,
    pub matching: Vec<Donor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HomeStats {
    pub appointments: usize,
    pub donors: usize,
    pub medicine_orders: usize,
    pub alerts: usize,
}

/// The explicit application state: store, rules and pending timers
pub struct Portal<S: SnapshotStorage> {
    store: ClientStore<S>,
    config: Config,
    scheduler: VerificationScheduler,
}

impl<S: SnapshotStorage> Portal<S> {
    pub fn new(store: ClientStore<S>, config: Config) -> Self {
        Self {
            store,
            config,
            scheduler: VerificationScheduler::new(),
        }
    }

    pub fn store(&self) -> &ClientStore<S> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scheduler(&self) -> &VerificationScheduler {
        &self.scheduler
    }

    /// Home is open to everyone; every other tab needs a signed-in user
    pub fn navigate(&self, tab: Tab) -> Result<Tab> {
        if tab.requires_login() && self.store.current_user().is_none() {
            return Err(Notice::LoginRequired.into());
        }
        Ok(tab)
    }

    pub fn require_user(&self) -> Result<User> {
        self.store
            .current_user()
            .cloned()
            .ok_or_else(|| Notice::LoginRequired.into())
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    pub fn signup(&mut self, form: &SignupForm) -> Result<()> {
        validation::require_fields(&[
            ("name", form.name.as_str()),
            ("email", form.email.as_str()),
            ("phone", form.phone.as_str()),
            ("password", form.password.as_str()),
            ("confirm", form.confirm_password.as_str()),
        ])?;
        validation::validate_email(form.email.trim())?;
        validation::validate_new_password(
            &form.password,
            &form.confirm_password,
            self.config.auth.min_password_len(),
        )?;
        let role = if form.role.trim().is_empty() {
            Role::Patient
        } else {
            Role::parse(&form.role).ok_or_else(|| Notice::UnknownRole(form.role.clone()))?
        };

        let created = self.store.signup(
            form.name.trim(),
            form.email.trim(),
            Some(form.phone.trim()),
            &form.password,
            role,
        )?;
        if !created {
            return Err(Notice::EmailTaken.into());
        }
        Ok(())
    }

    pub fn login(&mut self, email: &str, password: &str) -> Result<User> {
        validation::require_fields(&[("email", email), ("password", password)])?;
        if !self.store.login(email.trim(), password)? {
            return Err(Notice::InvalidCredentials.into());
        }
        self.require_user()
    }

    pub fn logout(&mut self) -> Result<()> {
        self.store.logout()
    }

    // ------------------------------------------------------------------
    // Appointments
    // ------------------------------------------------------------------

    pub fn queue_info(&self, hospital: &str, specialty: &str, date: NaiveDate) -> QueueInfo {
        let booked = self.store.get_today_appointments(hospital, specialty, date);
        let count = booked.len();
        let completed = booked
            .iter()
            .filter(|a| a.status == AppointmentStatus::Completed)
            .count();
        let waiting = count - completed;
        QueueInfo {
            count,
            completed,
            waiting,
            full: count >= self.config.queue.capacity(),
            next_number: count + 1,
            estimated_wait_minutes: waiting as u32 * self.config.queue.minutes_per_patient(),
        }
    }

    /// Queue lookup from raw input, normalised the same way booking is
    pub fn queue_for(&self, form: &QueueForm) -> Result<QueueInfo> {
        validation::require_fields(&[
            ("hospital", form.hospital.as_str()),
            ("specialty", form.specialty.as_str()),
            ("date", form.date.as_str()),
        ])?;
        let (hospital, specialty, date) =
            resolve_slot(&form.hospital, &form.specialty, &form.date)?;
        Ok(self.queue_info(hospital, specialty, date))
    }

    pub fn book_appointment(
        &mut self,
        form: &AppointmentForm,
        today: NaiveDate,
    ) -> Result<BookingOutcome> {
        let user = self.require_user()?;
        validation::require_fields(&[
            ("patient", form.patient_name.as_str()),
            ("hospital", form.hospital.as_str()),
            ("specialty", form.specialty.as_str()),
            ("date", form.date.as_str()),
            ("contact", form.contact.as_str()),
        ])?;
        let (hospital, specialty, date) =
            resolve_slot(&form.hospital, &form.specialty, &form.date)?;
        validation::validate_not_past(date, today)?;

        let queue = self.queue_info(hospital, specialty, date);
        if queue.full {
            self.store.add_alert(
                Some(user.email.as_str()),
                &format!(
                    "Waitlist: Appointment request for {} at {} on {}. Will notify when slot available.",
                    specialty, hospital, date
                ),
            )?;
            return Ok(BookingOutcome::Waitlisted {
                hospital: hospital.to_string(),
                specialty: specialty.to_string(),
                date,
            });
        }

        let number = format!("OP {}", queue.next_number);
        let appointment = self.store.add_appointment(NewAppointment {
            name: form.patient_name.trim().to_string(),
            hospital: hospital.to_string(),
            specialty: specialty.to_string(),
            date,
            appointment_number: number.clone(),
            contact: form.contact.trim().to_string(),
            user: user.email.clone(),
            status: AppointmentStatus::Confirmed,
            booked_at: Utc::now(),
        })?;

        self.store.add_alert(
            Some(user.email.as_str()),
            &format!(
                "Appointment confirmed! Your appointment number is {} with {} at {} on {}",
                number, specialty, hospital, date
            ),
        )?;
        self.store.add_alert(
            Some(user.email.as_str()),
            "Queue monitoring activated: We'll notify you when your turn approaches",
        )?;
        Ok(BookingOutcome::Confirmed(appointment))
    }

    // ------------------------------------------------------------------
    // Blood
    // ------------------------------------------------------------------

    pub fn register_donor(&mut self, form: &DonorForm) -> Result<Donor> {
        let user = self.require_user()?;
        validation::require_fields(&[
            ("name", form.name.as_str()),
            ("blood", form.blood.as_str()),
            ("age", form.age.as_str()),
            ("contact", form.contact.as_str()),
            ("area", form.area.as_str()),
        ])?;
        let blood = parse_blood(&form.blood)?;
        let age = validation::validate_donor_age(
            &form.age,
            self.config.donor.min_age(),
            self.config.donor.max_age(),
        )?;

        let donor = self.store.add_donor(NewDonor {
            name: form.name.trim().to_string(),
            blood,
            age,
            contact: form.contact.trim().to_string(),
            area: form.area.trim().to_string(),
            user: user.email.clone(),
            registered: Utc::now(),
        })?;
        self.store.add_alert(
            Some(user.email.as_str()),
            &format!(
                "Successfully registered as {} blood donor in {}",
                blood, donor.area
            ),
        )?;
        Ok(donor)
    }

    pub fn request_blood(&mut self, form: &BloodRequestForm) -> Result<BloodRequestOutcome> {
        let user = self.require_user()?;
        validation::require_fields(&[
            ("patient", form.patient_name.as_str()),
            ("blood", form.blood.as_str()),
            ("hospital", form.hospital.as_str()),
            ("location", form.location.as_str()),
            ("contact", form.contact.as_str()),
        ])?;
        let blood = parse_blood(&form.blood)?;
        let hospital = form.hospital.trim();
        let location = form.location.trim();
        let contact = form.contact.trim();

        let request = self.store.add_blood_request(NewBloodRequest {
            name: form.patient_name.trim().to_string(),
            blood,
            hospital: hospital.to_string(),
            location: location.to_string(),
            contact: contact.to_string(),
            user: user.email.clone(),
            requested: Utc::now(),
        })?;

        let matching: Vec<Donor> = self
            .store
            .get_matching_donors(blood, location)
            .into_iter()
            .cloned()
            .collect();

        if matching.is_empty() {
            self.store.add_alert(
                Some(user.email.as_str()),
                &format!(
                    "Blood request placed for {}. No nearby donors available yet. We'll notify you when donors register.",
                    blood
                ),
            )?;
        } else {
            self.store.add_alert(
                Some(user.email.as_str()),
                &format!(
                    "URGENT: {} blood needed for {} at {}, {}. {} matching donor(s) found nearby!",
                    blood,
                    request.name,
                    hospital,
                    location,
                    matching.len()
                ),
            )?;
            let message = format!(
                "Blood donation request: {} needed at {}, {}. Contact: {}",
                blood, hospital, location, contact
            );
            for donor in &matching {
                self.store.add_alert(Some(donor.user.as_str()), &message)?;
            }
        }

        Ok(BloodRequestOutcome {
            request_id: request.id,
            matching,
        })
    }

    // ------------------------------------------------------------------
    // Medicine
    // ------------------------------------------------------------------

    /// Place the order and schedule its verification, keyed by the new id
    pub fn place_medicine_order(
        &mut self,
        form: &MedicineForm,
        now: DateTime<Utc>,
    ) -> Result<MedicineOrder> {
        let user = self.require_user()?;
        validation::require_fields(&[
            ("patient", form.patient_name.as_str()),
            ("prescription", form.prescription_file.as_str()),
            ("address", form.address.as_str()),
            ("contact", form.contact.as_str()),
        ])?;
        let time = if form.delivery_time.trim().is_empty() {
            DeliveryWindow::Anytime
        } else {
            DeliveryWindow::parse(&form.delivery_time)
                .ok_or_else(|| Notice::UnknownDeliveryWindow(form.delivery_time.clone()))?
        };

        let order = self.store.add_medicine(NewMedicineOrder {
            name: form.patient_name.trim().to_string(),
            file: file_name(&form.prescription_file),
            address: form.address.trim().to_string(),
            contact: form.contact.trim().to_string(),
            time,
            user: user.email.clone(),
            status: OrderStatus::PendingVerification,
            ordered: now,
        })?;
        self.store.add_alert(
            Some(user.email.as_str()),
            &format!(
                "Prescription uploaded for {}. Pharmacy verification in progress...",
                order.name
            ),
        )?;
        self.scheduler.schedule(
            &order.id,
            &order.name,
            &order.address,
            &user.email,
            now,
            self.config.medicine.verification_delay_ms(),
        );
        Ok(order)
    }

    /// Fire every verification that is due. Returns the orders that moved.
    /// On a storage failure the failed entry and the rest of the batch go
    /// back on the schedule before the error is returned.
    pub fn run_due_verifications(&mut self, now: DateTime<Utc>) -> Result<Vec<MedicineOrder>> {
        let mut verified = Vec::new();
        let mut due = self.scheduler.take_due(now).into_iter();
        while let Some(entry) = due.next() {
            match self.verify(&entry) {
                Ok(Some(order)) => verified.push(order),
                Ok(None) => {}
                Err(e) => {
                    self.scheduler.requeue(std::iter::once(entry).chain(due));
                    return Err(e);
                }
            }
        }
        Ok(verified)
    }

    fn verify(&mut self, due: &PendingVerification) -> Result<Option<MedicineOrder>> {
        if !self
            .store
            .update_medicine_status(&due.order_id, OrderStatus::OutForDelivery)?
        {
            return Ok(None);
        }
        self.store.add_alert(
            Some(due.user_email.as_str()),
            &format!(
                "Prescription verified! Medicine for {} will be delivered by end of day to {}.",
                due.patient, due.address
            ),
        )?;
        Ok(self.store.medicine(&due.order_id).cloned())
    }

    /// Admin-only: close out a verified order
    pub fn mark_delivered(&mut self, order_id: &str) -> Result<MedicineOrder> {
        let user = self.require_user()?;
        if user.role != Role::Admin {
            return Err(Notice::Forbidden("Admin").into());
        }
        let Some(order) = self.store.medicine(order_id).cloned() else {
            return Err(Notice::UnknownOrder(order_id.to_string()).into());
        };
        if self
            .store
            .update_medicine_status(order_id, OrderStatus::Delivered)?
        {
            self.store.add_alert(
                Some(order.user.as_str()),
                &format!("Medicine for {} has been delivered.", order.name),
            )?;
        }
        Ok(self.store.medicine(order_id).cloned().unwrap_or(order))
    }

    pub fn home_stats(&self) -> HomeStats {
        let state = self.store.state();
        HomeStats {
            appointments: state.appointments.len(),
            donors: state.donors.len(),
            medicine_orders: state.medicines.len(),
            alerts: state.alerts.len(),
        }
    }
}

/// Catalog spelling of hospital and specialty, plus the parsed date
fn resolve_slot(
    hospital: &str,
    specialty: &str,
    date: &str,
) -> Result<(&'static str, &'static str, NaiveDate), Notice> {
    let hospital = catalog_lookup(HOSPITALS, hospital)
        .ok_or_else(|| Notice::UnknownHospital(hospital.to_string()))?;
    let specialty = catalog_lookup(SPECIALTIES, specialty)
        .ok_or_else(|| Notice::UnknownSpecialty(specialty.to_string()))?;
    let date = validation::parse_date(date)?;
    Ok((hospital, specialty, date))
}

fn parse_blood(s: &str) -> Result<BloodType, Notice> {
    BloodType::parse(s).ok_or_else(|| Notice::UnknownBloodType(s.to_string()))
}

/// Only the file name of an upload is kept, never its path or content
fn file_name(path: &str) -> String {
    let trimmed = path.trim();
    std::path::Path::new(trimmed)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::store::tests::{appointment, memory_store};
    use crate::store::DEFAULT_KEY;
    use chrono::Duration;
    use std::cell::Cell;
    use std::rc::Rc;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 5, 10).unwrap()
    }

    fn notice(err: anyhow::Error) -> Notice {
        err.downcast::<Notice>().expect("expected a notice")
    }

    fn signup_form(email: &str, role: &str) -> SignupForm {
        SignupForm {
            name: "Ravi".to_string(),
            email: email.to_string(),
            phone: "9876543210".to_string(),
            password: "secret1".to_string(),
            confirm_password: "secret1".to_string(),
            role: role.to_string(),
        }
    }

    fn portal_as(email: &str, role: &str) -> Portal<MemoryStorage> {
        let mut portal = Portal::new(memory_store(), Config::default());
        portal.signup(&signup_form(email, role)).unwrap();
        portal.login(email, "secret1").unwrap();
        portal
    }

    fn booking(date: &str) -> AppointmentForm {
        AppointmentForm {
            patient_name: "Ravi".to_string(),
            hospital: "Apollo Hospitals".to_string(),
            specialty: "Dentist".to_string(),
            date: date.to_string(),
            contact: "9876543210".to_string(),
        }
    }

    fn medicine(name: &str) -> MedicineForm {
        MedicineForm {
            patient_name: name.to_string(),
            prescription_file: "/home/ravi/scans/rx.pdf".to_string(),
            address: format!("{} street", name),
            contact: "9111111111".to_string(),
            delivery_time: String::new(),
        }
    }

    #[test]
    fn test_navigation_requires_login() {
        let mut portal = Portal::new(memory_store(), Config::default());
        assert_eq!(portal.navigate(Tab::Home).unwrap(), Tab::Home);
        for tab in [Tab::Appointments, Tab::Blood, Tab::Medicine, Tab::Alerts] {
            assert_eq!(notice(portal.navigate(tab).unwrap_err()), Notice::LoginRequired);
        }

        portal.signup(&signup_form("ravi@example.com", "")).unwrap();
        portal.login("ravi@example.com", "secret1").unwrap();
        assert_eq!(portal.navigate(Tab::Alerts).unwrap(), Tab::Alerts);
    }

    #[test]
    fn test_signup_notices() {
        let mut portal = Portal::new(memory_store(), Config::default());

        let mut short = signup_form("a@example.com", "");
        short.password = "abc".to_string();
        short.confirm_password = "abc".to_string();
        assert_eq!(
            notice(portal.signup(&short).unwrap_err()),
            Notice::PasswordTooShort { min: 6 }
        );

        let mut mismatch = signup_form("a@example.com", "");
        mismatch.confirm_password = "secret2".to_string();
        assert_eq!(notice(portal.signup(&mismatch).unwrap_err()), Notice::PasswordMismatch);

        let mut missing = signup_form("a@example.com", "");
        missing.phone.clear();
        assert!(matches!(
            notice(portal.signup(&missing).unwrap_err()),
            Notice::MissingFields(_)
        ));

        portal.signup(&signup_form("a@example.com", "Donor")).unwrap();
        assert_eq!(
            notice(portal.signup(&signup_form("a@example.com", "")).unwrap_err()),
            Notice::EmailTaken
        );
        assert_eq!(portal.store().state().users.len(), 1);
        assert_eq!(portal.store().state().users[0].role, Role::Donor);
        assert_eq!(portal.store().state().users[0].phone.as_deref(), Some("9876543210"));
    }

    #[test]
    fn test_login_invalid_credentials() {
        let mut portal = Portal::new(memory_store(), Config::default());
        portal.signup(&signup_form("a@example.com", "")).unwrap();
        assert_eq!(
            notice(portal.login("a@example.com", "wrong-pass").unwrap_err()),
            Notice::InvalidCredentials
        );
        assert!(portal.store().current_user().is_none());
    }

    #[test]
    fn test_booking_numbers_follow_queue() {
        let mut portal = portal_as("ravi@example.com", "");
        let first = portal.book_appointment(&booking("2030-05-12"), today()).unwrap();
        let second = portal.book_appointment(&booking("2030-05-12"), today()).unwrap();
        let other_day = portal.book_appointment(&booking("2030-05-13"), today()).unwrap();

        let number = |o: &BookingOutcome| match o {
            BookingOutcome::Confirmed(a) => a.appointment_number.clone(),
            BookingOutcome::Waitlisted { .. } => panic!("unexpected waitlist"),
        };
        assert_eq!(number(&first), "OP 1");
        assert_eq!(number(&second), "OP 2");
        assert_eq!(number(&other_day), "OP 1");

        let alerts = portal.store().alerts_for("ravi@example.com");
        assert!(alerts[1].message.contains("OP 1 with Dentist at Apollo Hospitals on 2030-05-13"));
    }

    #[test]
    fn test_booking_rejects_past_and_unknown() {
        let mut portal = portal_as("ravi@example.com", "");
        assert_eq!(
            notice(portal.book_appointment(&booking("2030-05-09"), today()).unwrap_err()),
            Notice::PastDate
        );
        let mut form = booking("2030-05-10");
        form.hospital = "Nowhere General".to_string();
        assert!(matches!(
            notice(portal.book_appointment(&form, today()).unwrap_err()),
            Notice::UnknownHospital(_)
        ));
        // Booking for today itself is allowed
        assert!(portal.book_appointment(&booking("2030-05-10"), today()).is_ok());
    }

    #[test]
    fn test_booking_requires_login() {
        let mut portal = Portal::new(memory_store(), Config::default());
        assert_eq!(
            notice(portal.book_appointment(&booking("2030-05-12"), today()).unwrap_err()),
            Notice::LoginRequired
        );
    }

    #[test]
    fn test_full_queue_goes_to_waitlist() {
        let mut store = memory_store();
        let date = NaiveDate::from_ymd_opt(2030, 5, 12).unwrap();
        for _ in 0..20 {
            store.add_appointment(appointment("Apollo Hospitals", "Dentist", date)).unwrap();
        }
        let mut portal = Portal::new(store, Config::default());
        portal.signup(&signup_form("ravi@example.com", "")).unwrap();
        portal.login("ravi@example.com", "secret1").unwrap();

        let info = portal.queue_info("Apollo Hospitals", "Dentist", date);
        assert!(info.full);
        assert_eq!(info.count, 20);

        let outcome = portal.book_appointment(&booking("2030-05-12"), today()).unwrap();
        assert!(matches!(outcome, BookingOutcome::Waitlisted { .. }));
        assert_eq!(
            portal.store().get_today_appointments("Apollo Hospitals", "Dentist", date).len(),
            20
        );
        let alerts = portal.store().alerts_for("ravi@example.com");
        assert!(alerts[0].message.starts_with("Waitlist:"));
    }

    #[test]
    fn test_queue_for_matches_booking_normalisation() {
        let mut store = memory_store();
        let date = NaiveDate::from_ymd_opt(2030, 5, 12).unwrap();
        for _ in 0..20 {
            store.add_appointment(appointment("Apollo Hospitals", "Dentist", date)).unwrap();
        }
        let portal = Portal::new(store, Config::default());

        let form = QueueForm {
            hospital: "apollo hospitals".to_string(),
            specialty: " DENTIST ".to_string(),
            date: "2030-05-12".to_string(),
        };
        let info = portal.queue_for(&form).unwrap();
        assert!(info.full);
        assert_eq!(info.count, 20);

        let blank = QueueForm {
            hospital: String::new(),
            ..form.clone()
        };
        assert_eq!(
            notice(portal.queue_for(&blank).unwrap_err()),
            Notice::MissingFields(vec!["hospital".to_string()])
        );
    }

    #[test]
    fn test_queue_info_counts_completed() {
        let mut store = memory_store();
        let date = NaiveDate::from_ymd_opt(2030, 5, 12).unwrap();
        for i in 0..4 {
            let mut a = appointment("CARE Hospitals", "Orthopedic", date);
            if i < 1 {
                a.status = AppointmentStatus::Completed;
            }
            store.add_appointment(a).unwrap();
        }
        let portal = Portal::new(store, Config::default());
        let info = portal.queue_info("CARE Hospitals", "Orthopedic", date);
        assert_eq!(
            info,
            QueueInfo {
                count: 4,
                completed: 1,
                waiting: 3,
                full: false,
                next_number: 5,
                estimated_wait_minutes: 45,
            }
        );
    }

    #[test]
    fn test_register_donor_age_bounds() {
        let mut portal = portal_as("asha@example.com", "Donor");
        let mut form = DonorForm {
            name: "Asha".to_string(),
            blood: "o+".to_string(),
            age: "17".to_string(),
            contact: "9000000000".to_string(),
            area: "Madhapur, Hyderabad".to_string(),
        };
        assert_eq!(
            notice(portal.register_donor(&form).unwrap_err()),
            Notice::AgeOutOfRange { min: 18, max: 65 }
        );
        assert!(portal.store().state().donors.is_empty());

        form.age = "65".to_string();
        let donor = portal.register_donor(&form).unwrap();
        assert_eq!(donor.blood, BloodType::OPos);
        assert_eq!(donor.user, "asha@example.com");
    }

    #[test]
    fn test_request_blood_notifies_matching_donors() {
        let mut portal = portal_as("asha@example.com", "Donor");
        portal
            .register_donor(&DonorForm {
                name: "Asha".to_string(),
                blood: "O+".to_string(),
                age: "30".to_string(),
                contact: "9000000000".to_string(),
                area: "Madhapur, Hyderabad".to_string(),
            })
            .unwrap();
        portal.logout().unwrap();
        portal.signup(&signup_form("ravi@example.com", "")).unwrap();
        portal.login("ravi@example.com", "secret1").unwrap();

        let form = BloodRequestForm {
            patient_name: "Meera".to_string(),
            blood: "O+".to_string(),
            hospital: "KIMS".to_string(),
            location: "hyderabad".to_string(),
            contact: "9222222222".to_string(),
        };
        let outcome = portal.request_blood(&form).unwrap();
        assert_eq!(outcome.matching.len(), 1);
        assert_eq!(portal.store().state().blood_requests.len(), 1);

        let requester = portal.store().alerts_for("ravi@example.com");
        assert!(requester[0].message.contains("1 matching donor(s)"));
        let donor = portal.store().alerts_for("asha@example.com");
        assert!(donor[0].message.contains("Contact: 9222222222"));

        let mut none = form.clone();
        none.blood = "AB-".to_string();
        assert!(portal.request_blood(&none).unwrap().matching.is_empty());
        let requester = portal.store().alerts_for("ravi@example.com");
        assert!(requester[0].message.contains("No nearby donors"));
    }

    #[test]
    fn test_verification_targets_its_own_order() {
        let mut portal = portal_as("ravi@example.com", "");
        let t0 = Utc::now();
        let first = portal.place_medicine_order(&medicine("First"), t0).unwrap();
        let second = portal
            .place_medicine_order(&medicine("Second"), t0 + Duration::seconds(3))
            .unwrap();
        assert_eq!(first.file, "rx.pdf");
        assert_eq!(first.status, OrderStatus::PendingVerification);

        let verified = portal.run_due_verifications(t0 + Duration::seconds(5)).unwrap();
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0].id, first.id);
        assert_eq!(
            portal.store().medicine(&second.id).unwrap().status,
            OrderStatus::PendingVerification
        );

        let verified = portal.run_due_verifications(t0 + Duration::seconds(8)).unwrap();
        assert_eq!(verified[0].id, second.id);
        assert!(portal.scheduler().is_empty());

        let alerts = portal.store().alerts_for("ravi@example.com");
        assert!(alerts[0].message.contains("Medicine for Second"));
    }

    /// Memory storage whose writes fail while `broken` is set
    struct FlakyStorage {
        inner: MemoryStorage,
        broken: Rc<Cell<bool>>,
    }

    impl SnapshotStorage for FlakyStorage {
        fn load(&self, key: &str) -> Result<Option<String>> {
            self.inner.load(key)
        }

        fn save(&mut self, key: &str, snapshot: &str) -> Result<()> {
            if self.broken.get() {
                anyhow::bail!("disk full");
            }
            self.inner.save(key, snapshot)
        }
    }

    #[test]
    fn test_failed_verification_batch_is_requeued() {
        let broken = Rc::new(Cell::new(false));
        let storage = FlakyStorage {
            inner: MemoryStorage::new(),
            broken: broken.clone(),
        };
        let (store, _) = ClientStore::open(storage, DEFAULT_KEY).unwrap();
        let mut portal = Portal::new(store, Config::default());
        portal.signup(&signup_form("ravi@example.com", "")).unwrap();
        portal.login("ravi@example.com", "secret1").unwrap();

        let t0 = Utc::now();
        let first = portal.place_medicine_order(&medicine("First"), t0).unwrap();
        let second = portal.place_medicine_order(&medicine("Second"), t0).unwrap();

        broken.set(true);
        assert!(portal.run_due_verifications(t0 + Duration::seconds(10)).is_err());
        assert_eq!(portal.scheduler().len(), 2);

        broken.set(false);
        portal.run_due_verifications(t0 + Duration::seconds(10)).unwrap();
        assert!(portal.scheduler().is_empty());
        for id in [&first.id, &second.id] {
            assert_eq!(
                portal.store().medicine(id).unwrap().status,
                OrderStatus::OutForDelivery
            );
        }
    }

    #[test]
    fn test_mark_delivered_is_admin_only() {
        let mut portal = portal_as("ravi@example.com", "");
        let t0 = Utc::now();
        let order = portal.place_medicine_order(&medicine("Ravi"), t0).unwrap();
        assert_eq!(
            notice(portal.mark_delivered(&order.id).unwrap_err()),
            Notice::Forbidden("Admin")
        );

        portal.logout().unwrap();
        portal.signup(&signup_form("admin@example.com", "Admin")).unwrap();
        portal.login("admin@example.com", "secret1").unwrap();
        assert!(matches!(
            notice(portal.mark_delivered("nope").unwrap_err()),
            Notice::UnknownOrder(_)
        ));
        let delivered = portal.mark_delivered(&order.id).unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);

        // A late verification must not move it backwards
        portal.run_due_verifications(t0 + Duration::seconds(10)).unwrap();
        assert_eq!(
            portal.store().medicine(&order.id).unwrap().status,
            OrderStatus::Delivered
        );
    }

    #[test]
    fn test_home_stats() {
        let mut portal = portal_as("ravi@example.com", "");
        portal.book_appointment(&booking("2030-05-12"), today()).unwrap();
        let stats = portal.home_stats();
        assert_eq!(stats.appointments, 1);
        assert_eq!(stats.donors, 0);
        assert_eq!(stats.medicine_orders, 0);
        assert_eq!(stats.alerts, 2);
    }

    #[test]
    fn test_file_name_strips_path() {
        assert_eq!(file_name("/tmp/scan.png"), "scan.png");
        assert_eq!(file_name("rx.pdf"), "rx.pdf");
    }
}
