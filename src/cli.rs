use crate::models::{BloodType, DeliveryWindow, HOSPITALS, SPECIALTIES};
use crate::portal::{
    AppointmentForm, BloodRequestForm, BookingOutcome, DonorForm, MedicineForm, Portal,
    QueueForm, SignupForm, Tab,
};
use crate::storage::SnapshotStorage;
use crate::transcript::Transcript;
use crate::validation::Notice;
use crate::Args;
use anyhow::{anyhow, Result};
use chrono::{Local, Utc};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::cell::RefCell;
use std::collections::HashMap;

pub type DynStorage = Box<dyn SnapshotStorage>;

pub struct Context {
    pub args: Args,
    pub session_id: String,
    pub transcript: RefCell<Transcript>,
    pub portal: RefCell<Portal<DynStorage>>,
    pub active_tab: RefCell<Tab>,
    /// Sequence number of the last snapshot write already logged
    pub logged_save: RefCell<u64>,
}

/// Run one command. Returns false when it failed with a message already
/// shown, so the caller only has to set the exit status.
pub fn run_once(ctx: &Context, command: &str) -> Result<bool> {
    if let Err(e) = dispatch(ctx, command) {
        report(&e);
        after_command(ctx)?;
        return Ok(false);
    }
    after_command(ctx)?;
    // Pending verifications would die with the process; let them fire
    loop {
        let next = ctx.portal.borrow().scheduler().next_due();
        let Some(due) = next else { break };
        if let Ok(wait) = (due - Utc::now()).to_std() {
            std::thread::sleep(wait);
        }
        after_command(ctx)?;
    }
    Ok(true)
}

pub fn run_repl(ctx: Context) -> Result<()> {
    let mut rl = DefaultEditor::new()?;

    println!("BookMyCare - type /help for commands, /exit to quit");

    loop {
        if let Err(e) = after_command(&ctx) {
            eprintln!("Error: {:#}", e);
        }
        let prompt = format!("[{}]> ", ctx.active_tab.borrow().as_str());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line)?;

                match dispatch(&ctx, line) {
                    Ok(true) => break,
                    Ok(false) => {}
                    Err(e) => report(&e),
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }

    after_command(&ctx)
}

/// Notices are expected outcomes; anything else is a fault
fn report(e: &anyhow::Error) {
    if let Some(notice) = e.downcast_ref::<Notice>() {
        println!("Error: {}", notice);
        if *notice == Notice::LoginRequired {
            println!("Use /login email=<email> password=<password> or /signup first.");
        }
    } else {
        eprintln!("Error: {:#}", e);
    }
}

/// Fire due verifications and log any snapshot writes made since last time
fn after_command(ctx: &Context) -> Result<()> {
    let verified = ctx.portal.borrow_mut().run_due_verifications(Utc::now())?;
    for order in &verified {
        println!(
            "Prescription verified! Delivery in progress for {} ({})",
            order.name, order.id
        );
        ctx.transcript
            .borrow_mut()
            .medicine_status(&order.id, order.status.as_str())?;
    }

    let portal = ctx.portal.borrow();
    if let Some(receipt) = portal.store().last_save() {
        let mut logged = ctx.logged_save.borrow_mut();
        if receipt.seq > *logged {
            *logged = receipt.seq;
            ctx.transcript
                .borrow_mut()
                .snapshot_saved(receipt.bytes, &receipt.sha256)?;
        }
    }
    Ok(())
}

/// Positional words and `key=value` pairs of one command line
struct CommandArgs {
    positional: Vec<String>,
    named: HashMap<String, String>,
}

impl CommandArgs {
    fn parse(input: &str) -> Result<Self> {
        let words =
            shell_words::split(input).map_err(|e| anyhow!("Could not parse arguments: {}", e))?;
        let mut positional = Vec::new();
        let mut named = HashMap::new();
        for word in words {
            match word.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    named.insert(key.to_lowercase().replace('-', "_"), value.to_string());
                }
                _ => positional.push(word),
            }
        }
        Ok(Self { positional, named })
    }

    /// Named value, else the positional word at `index`, else empty
    fn get(&self, key: &str, index: usize) -> String {
        self.named
            .get(key)
            .cloned()
            .or_else(|| self.positional.get(index).cloned())
            .unwrap_or_default()
    }

    fn named(&self, key: &str) -> String {
        self.named.get(key).cloned().unwrap_or_default()
    }
}

/// Returns true when the shell should exit
pub fn dispatch(ctx: &Context, line: &str) -> Result<bool> {
    if !line.starts_with('/') {
        println!("Commands start with '/'. Type /help for the list.");
        return Ok(false);
    }
    let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
    let args = CommandArgs::parse(rest)?;

    match cmd {
        "/exit" | "/quit" => return Ok(true),
        "/help" => print_help(),
        "/catalog" => print_catalog(),
        "/session" => {
            println!("Session: {}", ctx.session_id);
            println!("Activity log: {:?}", ctx.transcript.borrow().path);
            let portal = ctx.portal.borrow();
            println!("Snapshot key: {}", portal.store().key());
            if ctx.args.ephemeral {
                println!("Storage: in-memory (nothing survives exit)");
            }
            println!("Pending verifications: {}", portal.scheduler().len());
        }
        "/home" => {
            *ctx.active_tab.borrow_mut() = Tab::Home;
            print_home(ctx);
        }
        "/tab" => {
            let name = args.get("name", 0);
            let tab = Tab::parse(&name).ok_or_else(|| {
                anyhow!(
                    "Unknown tab '{}'. Tabs: {}",
                    name,
                    Tab::ALL.map(|t| t.as_str()).join(", ")
                )
            })?;
            enter_tab(ctx, tab)?;
            println!("Now on: {}", tab.as_str());
        }
        "/signup" => {
            let form = SignupForm {
                name: args.named("name"),
                email: args.named("email"),
                phone: args.named("phone"),
                password: args.named("password"),
                confirm_password: args.named("confirm"),
                role: args.named("role"),
            };
            ctx.portal.borrow_mut().signup(&form)?;
            ctx.transcript.borrow_mut().signup(
                form.email.trim(),
                if form.role.is_empty() {
                    "Patient"
                } else {
                    form.role.as_str()
                },
            )?;
            println!("Account created! Please login");
        }
        "/login" => {
            let email = args.get("email", 0);
            let password = args.get("password", 1);
            let result = ctx.portal.borrow_mut().login(&email, &password);
            ctx.transcript.borrow_mut().login(&email, result.is_ok())?;
            let user = result?;
            println!("Welcome back, {} ({})!", user.name, user.role.as_str());
        }
        "/logout" => {
            let email = ctx
                .portal
                .borrow()
                .store()
                .current_user()
                .map(|u| u.email.clone());
            ctx.portal.borrow_mut().logout()?;
            ctx.transcript.borrow_mut().logout(email.as_deref())?;
            *ctx.active_tab.borrow_mut() = Tab::Home;
            println!("Logged out");
        }
        "/whoami" => match ctx.portal.borrow().store().current_user() {
            Some(user) => println!("{} <{}> - {}", user.name, user.email, user.role.as_str()),
            None => println!("Not logged in"),
        },
        "/queue" => {
            enter_tab(ctx, Tab::Appointments)?;
            let form = QueueForm {
                hospital: args.named("hospital"),
                specialty: args.named("specialty"),
                date: args.named("date"),
            };
            let info = ctx.portal.borrow().queue_for(&form)?;
            if info.count == 0 {
                println!("No appointments yet - you will be OP 1");
            } else if info.full {
                println!("All {} slots are booked - new requests go to the waitlist", info.count);
            } else {
                println!("Appointments in queue: {}", info.waiting);
                println!("Estimated wait time: ~{} minutes", info.estimated_wait_minutes);
                println!("Your number would be: OP {}", info.next_number);
            }
        }
        "/book" => {
            enter_tab(ctx, Tab::Appointments)?;
            let form = AppointmentForm {
                patient_name: args.named("patient"),
                hospital: args.named("hospital"),
                specialty: args.named("specialty"),
                date: args.named("date"),
                contact: args.named("contact"),
            };
            let today = Local::now().date_naive();
            let outcome = ctx.portal.borrow_mut().book_appointment(&form, today)?;
            match outcome {
                BookingOutcome::Confirmed(appt) => {
                    ctx.transcript.borrow_mut().appointment_booked(
                        &appt.id,
                        &appt.appointment_number,
                        &appt.hospital,
                    )?;
                    println!("Appointment booked! Your number is {}", appt.appointment_number);
                }
                BookingOutcome::Waitlisted {
                    hospital,
                    specialty,
                    date,
                } => {
                    ctx.transcript.borrow_mut().waitlisted(
                        &hospital,
                        &specialty,
                        &date.to_string(),
                    )?;
                    println!("All appointments are booked! Added to waitlist");
                }
            }
        }
        "/appointments" => {
            enter_tab(ctx, Tab::Appointments)?;
            let portal = ctx.portal.borrow();
            let user = portal.require_user()?;
            let mine = portal.store().appointments_for(&user.email);
            if mine.is_empty() {
                println!("No appointments booked yet");
            }
            for a in mine {
                println!(
                    "{}  {}  {} / {}  {}  [{}]",
                    a.appointment_number,
                    a.date,
                    a.hospital,
                    a.specialty,
                    a.name,
                    a.status.as_str()
                );
            }
        }
        "/donor" => {
            enter_tab(ctx, Tab::Blood)?;
            let form = DonorForm {
                name: args.named("name"),
                blood: args.named("blood"),
                age: args.named("age"),
                contact: args.named("contact"),
                area: args.named("area"),
            };
            let donor = ctx.portal.borrow_mut().register_donor(&form)?;
            ctx.transcript
                .borrow_mut()
                .donor_registered(&donor.id, donor.blood.as_str())?;
            println!("Registered as donor successfully!");
        }
        "/donors" => {
            enter_tab(ctx, Tab::Blood)?;
            let portal = ctx.portal.borrow();
            let recent = portal.store().donors_recent(10);
            if recent.is_empty() {
                println!("No donors registered yet");
            }
            for d in recent {
                println!("{}  {}  age {}  {}  {}", d.blood, d.name, d.age, d.area, d.contact);
            }
        }
        "/request-blood" => {
            enter_tab(ctx, Tab::Blood)?;
            let form = BloodRequestForm {
                patient_name: args.named("patient"),
                blood: args.named("blood"),
                hospital: args.named("hospital"),
                location: args.named("location"),
                contact: args.named("contact"),
            };
            let outcome = ctx.portal.borrow_mut().request_blood(&form)?;
            let blood = BloodType::parse(&form.blood).map_or("", |b| b.as_str());
            ctx.transcript.borrow_mut().blood_requested(
                &outcome.request_id,
                blood,
                outcome.matching.len(),
            )?;
            if outcome.matching.is_empty() {
                println!("No matching donors found nearby");
            } else {
                println!("Found {} {} donor(s) nearby!", outcome.matching.len(), blood);
            }
        }
        "/order" => {
            enter_tab(ctx, Tab::Medicine)?;
            let form = MedicineForm {
                patient_name: args.named("patient"),
                prescription_file: args.named("file"),
                address: args.named("address"),
                contact: args.named("contact"),
                delivery_time: args.named("time"),
            };
            let order = ctx.portal.borrow_mut().place_medicine_order(&form, Utc::now())?;
            let delay = ctx.portal.borrow().config().medicine.verification_delay_ms();
            ctx.transcript.borrow_mut().medicine_ordered(&order.id, delay)?;
            println!("Medicine order placed successfully! ({})", order.id);
        }
        "/orders" => {
            enter_tab(ctx, Tab::Medicine)?;
            let portal = ctx.portal.borrow();
            let user = portal.require_user()?;
            let mine = portal.store().medicines_for(&user.email);
            if mine.is_empty() {
                println!("No medicine orders yet");
            }
            for m in mine {
                println!(
                    "{}  {}  {}  {}  [{}]",
                    m.id,
                    m.name,
                    m.file,
                    m.time.as_str(),
                    m.status.as_str()
                );
            }
        }
        "/deliver" => {
            enter_tab(ctx, Tab::Medicine)?;
            let id = args.get("id", 0);
            let order = ctx.portal.borrow_mut().mark_delivered(&id)?;
            ctx.transcript
                .borrow_mut()
                .medicine_status(&order.id, order.status.as_str())?;
            println!("Order {} is now: {}", order.id, order.status.as_str());
        }
        "/alerts" => {
            enter_tab(ctx, Tab::Alerts)?;
            let portal = ctx.portal.borrow();
            let user = portal.require_user()?;
            let mine = portal.store().alerts_for(&user.email);
            if mine.is_empty() {
                println!("No alerts yet");
            }
            for alert in mine {
                println!(
                    "{}  {}",
                    alert.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                    alert.message
                );
            }
        }
        "/wait" => {
            let next = ctx.portal.borrow().scheduler().next_due();
            match next {
                Some(due) => {
                    if let Ok(wait) = (due - Utc::now()).to_std() {
                        println!("Waiting {} ms for pharmacy verification...", wait.as_millis());
                        std::thread::sleep(wait);
                    }
                }
                None => println!("Nothing pending"),
            }
        }
        _ => println!("Unknown command: {}", cmd),
    }
    Ok(false)
}

/// Tabs other than home need a signed-in user
fn enter_tab(ctx: &Context, tab: Tab) -> Result<()> {
    let tab = ctx.portal.borrow().navigate(tab)?;
    *ctx.active_tab.borrow_mut() = tab;
    Ok(())
}

fn print_home(ctx: &Context) {
    let stats = ctx.portal.borrow().home_stats();
    println!("Welcome to BookMyCare!");
    println!("  Appointments:    {}", stats.appointments);
    println!("  Blood Donors:    {}", stats.donors);
    println!("  Medicine Orders: {}", stats.medicine_orders);
    println!("  Alerts:          {}", stats.alerts);
}

pub fn print_catalog() {
    println!("Hospitals:");
    for h in HOSPITALS {
        println!("  {}", h);
    }
    println!("Specializations:");
    for s in SPECIALTIES {
        println!("  {}", s);
    }
    println!(
        "Blood types: {}",
        BloodType::ALL.map(|b| b.as_str()).join(", ")
    );
    println!("Delivery times:");
    for w in DeliveryWindow::ALL {
        println!("  {}", w.as_str());
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /exit                     - quit");
    println!("  /help                     - show commands");
    println!("  /home                     - portal statistics");
    println!("  /tab <name>               - switch tab (home|appointments|blood|medicine|alerts)");
    println!("  /catalog                  - hospitals, specializations, blood types");
    println!("  /session                  - session id, activity log, storage");
    println!("Account:");
    println!("  /signup name= email= phone= password= confirm= [role=Patient|Doctor|Donor|Admin]");
    println!("  /login <email> <password>");
    println!("  /logout");
    println!("  /whoami");
    println!("Appointments:");
    println!("  /queue hospital= specialty= date=YYYY-MM-DD");
    println!("  /book patient= hospital= specialty= date=YYYY-MM-DD contact=");
    println!("  /appointments             - your appointments");
    println!("Blood:");
    println!("  /donor name= blood= age= contact= area=");
    println!("  /donors                   - latest registered donors");
    println!("  /request-blood patient= blood= hospital= location= contact=");
    println!("Medicine:");
    println!("  /order patient= file= address= contact= [time=morning|afternoon|evening|anytime]");
    println!("  /orders                   - your medicine orders");
    println!("  /deliver <order-id>       - mark delivered (Admin)");
    println!("  /wait                     - wait for pending pharmacy verification");
    println!("Alerts:");
    println!("  /alerts                   - your notifications");
    println!("Values with spaces need quotes: hospital=\"Apollo Hospitals\"");
}
