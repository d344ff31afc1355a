use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only JSONL activity log for one shell session
pub struct Transcript {
    pub path: PathBuf,
    session_id: String,
    file: File,
    echo: bool,
}

#[derive(Serialize)]
struct Event<'a> {
    ts: DateTime<Utc>,
    session_id: &'a str,
    #[serde(rename = "type")]
    event_type: &'a str,
    #[serde(flatten)]
    data: serde_json::Value,
}

impl Transcript {
    pub fn new(path: &Path, session_id: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            session_id: session_id.to_string(),
            file,
            echo: false,
        })
    }

    /// Mirror every event to stderr
    pub fn set_echo(&mut self, echo: bool) {
        self.echo = echo;
    }

    pub fn log(&mut self, event_type: &str, data: serde_json::Value) -> Result<()> {
        let event = Event {
            ts: Utc::now(),
            session_id: &self.session_id,
            event_type,
            data,
        };
        let line = serde_json::to_string(&event)?;
        writeln!(self.file, "{}", line)?;
        self.file.flush()?;
        if self.echo {
            eprintln!("[TRACE] {} {}", event_type, serde_json::to_string(&event.data)?);
        }
        Ok(())
    }

    pub fn session_start(&mut self, snapshot: &str, users: usize) -> Result<()> {
        self.log(
            "session_start",
            serde_json::json!({ "snapshot": snapshot, "users": users }),
        )
    }

    pub fn signup(&mut self, email: &str, role: &str) -> Result<()> {
        self.log("signup", serde_json::json!({ "email": email, "role": role }))
    }

    pub fn login(&mut self, email: &str, ok: bool) -> Result<()> {
        let event = if ok { "login" } else { "login_failed" };
        self.log(event, serde_json::json!({ "email": email }))
    }

    pub fn logout(&mut self, email: Option<&str>) -> Result<()> {
        self.log("logout", serde_json::json!({ "email": email }))
    }

    pub fn appointment_booked(&mut self, id: &str, number: &str, hospital: &str) -> Result<()> {
        self.log(
            "appointment_booked",
            serde_json::json!({ "id": id, "number": number, "hospital": hospital }),
        )
    }

    pub fn waitlisted(&mut self, hospital: &str, specialty: &str, date: &str) -> Result<()> {
        self.log(
            "waitlisted",
            serde_json::json!({ "hospital": hospital, "specialty": specialty, "date": date }),
        )
    }

    pub fn donor_registered(&mut self, id: &str, blood: &str) -> Result<()> {
        self.log(
            "donor_registered",
            serde_json::json!({ "id": id, "blood": blood }),
        )
    }

    pub fn blood_requested(&mut self, id: &str, blood: &str, matches: usize) -> Result<()> {
        self.log(
            "blood_requested",
            serde_json::json!({ "id": id, "blood": blood, "matches": matches }),
        )
    }

    pub fn medicine_ordered(&mut self, id: &str, due_in_ms: u64) -> Result<()> {
        self.log(
            "medicine_ordered",
            serde_json::json!({ "id": id, "verify_in_ms": due_in_ms }),
        )
    }

    pub fn medicine_status(&mut self, id: &str, status: &str) -> Result<()> {
        self.log(
            "medicine_status",
            serde_json::json!({ "id": id, "status": status }),
        )
    }

    /// Log a snapshot write: byte length and SHA-256 of what hit storage
    pub fn snapshot_saved(&mut self, bytes: usize, sha256: &str) -> Result<()> {
        self.log(
            "snapshot_saved",
            serde_json::json!({ "bytes": bytes, "sha256": sha256 }),
        )
    }

    pub fn snapshot_discarded(&mut self, error: &str) -> Result<()> {
        self.log("snapshot_discarded", serde_json::json!({ "error": error }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_events_are_json_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("activity").join("s1.jsonl");
        let mut transcript = Transcript::new(&path, "s1").unwrap();
        transcript.signup("a@b.com", "Patient").unwrap();
        transcript.login("a@b.com", false).unwrap();
        transcript.snapshot_saved(42, "abc").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["type"], "signup");
        assert_eq!(lines[0]["session_id"], "s1");
        assert_eq!(lines[0]["email"], "a@b.com");
        assert_eq!(lines[1]["type"], "login_failed");
        assert_eq!(lines[2]["bytes"], 42);
    }

    #[test]
    fn test_transcript_appends_across_opens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.jsonl");
        Transcript::new(&path, "s").unwrap().logout(None).unwrap();
        Transcript::new(&path, "s").unwrap().logout(Some("x@y.z")).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
