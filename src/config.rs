use std::env;
use std::path::PathBuf;

use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub session_ttl_hours: i64,
    pub upload_dir: PathBuf,
    pub clinic_name: String,
    pub reminder_interval_minutes: u64,
    pub db_max_connections: u32,
    pub bootstrap_staff: Option<(String, String)>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, reading values through `lookup` instead of the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;
        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8080".to_string());
        let session_ttl_hours = lookup("SESSION_TTL_HOURS")
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|h| *h > 0)
            .unwrap_or(24);
        let upload_dir = lookup("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./media"));
        let clinic_name = lookup("CLINIC_NAME")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Clinic".to_string());
        let reminder_interval_minutes = lookup("REMINDER_INTERVAL_MINUTES")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|m| *m > 0)
            .unwrap_or(60);
        let db_max_connections = lookup("DB_MAX_CONNECTIONS")
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(10);

        // both or nothing
        let bootstrap_staff = match (
            lookup("BOOTSTRAP_STAFF_USERNAME"),
            lookup("BOOTSTRAP_STAFF_PASSWORD"),
        ) {
            (Some(u), Some(p)) if !u.trim().is_empty() && !p.is_empty() => {
                Some((u.trim().to_string(), p))
            }
            _ => None,
        };

        Ok(Self {
            database_url,
            bind_addr,
            session_ttl_hours,
            upload_dir,
            clinic_name,
            reminder_interval_minutes,
            db_max_connections,
            bootstrap_staff,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let cfg =
            Config::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://localhost/clinic")]))
                .unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:8080");
        assert_eq!(cfg.session_ttl_hours, 24);
        assert_eq!(cfg.upload_dir, PathBuf::from("./media"));
        assert_eq!(cfg.clinic_name, "Clinic");
        assert_eq!(cfg.reminder_interval_minutes, 60);
        assert_eq!(cfg.db_max_connections, 10);
        assert!(cfg.bootstrap_staff.is_none());
    }

    #[test]
    fn database_url_is_required() {
        assert!(Config::from_lookup(lookup_from(&[])).is_err());
    }

    #[test]
    fn unparsable_numbers_fall_back() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://x"),
            ("SESSION_TTL_HOURS", "soon"),
            ("REMINDER_INTERVAL_MINUTES", "0"),
            ("DB_MAX_CONNECTIONS", "4"),
        ]))
        .unwrap();
        assert_eq!(cfg.session_ttl_hours, 24);
        assert_eq!(cfg.reminder_interval_minutes, 60);
        assert_eq!(cfg.db_max_connections, 4);
    }

    #[test]
    fn bootstrap_staff_needs_both_values() {
        let half = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://x"),
            ("BOOTSTRAP_STAFF_USERNAME", "admin"),
        ]))
        .unwrap();
        assert!(half.bootstrap_staff.is_none());

        let full = Config::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://x"),
            ("BOOTSTRAP_STAFF_USERNAME", " admin "),
            ("BOOTSTRAP_STAFF_PASSWORD", "s3cret-pass"),
        ]))
        .unwrap();
        assert_eq!(full.bootstrap_staff, Some(("admin".to_string(), "s3cret-pass".to_string())));
    }
}
