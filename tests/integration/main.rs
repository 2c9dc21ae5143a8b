//! Integration tests for Scrip

/// Isolated cache and config locations for one test
struct Sandbox {
    dir: tempfile::TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            dir: tempfile::TempDir::new().unwrap(),
        }
    }

    fn cache_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("cache")
    }

    fn config_path(&self) -> std::path::PathBuf {
        self.dir.path().join("config.toml")
    }

    fn write_config(&self, content: &str) {
        std::fs::write(self.config_path(), content).unwrap();
    }
}

mod cli_tests {
    use super::Sandbox;
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use scrip::cache::{ArtifactStore, CacheKey, Registry, WriteLease};

    fn scrip(sandbox: &Sandbox) -> Command {
        let mut cmd = cargo_bin_cmd!("scrip");
        cmd.env("SCRIP_PATH", sandbox.cache_dir())
            .env("SCRIP_CONFIG", sandbox.config_path())
            .env_remove("SCRIP_CLEANUP_DAYS")
            .env_remove("SCRIP_LOG");
        cmd
    }

    fn go_installed() -> bool {
        std::process::Command::new("go")
            .arg("version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Insert an unlocked entry, last used `days` ago
    fn seed_entry(sandbox: &Sandbox, content: &[u8], days: i64) -> CacheKey {
        let registry = Registry::open(&sandbox.cache_dir()).unwrap();
        let store = ArtifactStore::new(&sandbox.cache_dir());
        let key = CacheKey::derive(content);

        let lease = WriteLease::acquire(&registry, &key).unwrap();
        std::fs::create_dir_all(store.dir(&key)).unwrap();
        std::fs::write(store.binary(&key), b"").unwrap();
        lease.release().unwrap();

        let conn = rusqlite::Connection::open(registry.path()).unwrap();
        let at = chrono::Utc::now() - chrono::Duration::days(days);
        conn.execute(
            "UPDATE entries SET last_access = ?1 WHERE key = ?2",
            rusqlite::params![at.timestamp_millis(), key.as_str()],
        )
        .unwrap();
        key
    }

    #[test]
    fn help_displays() {
        let sandbox = Sandbox::new();
        scrip(&sandbox)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Go scripts"));
    }

    #[test]
    fn version_displays() {
        let sandbox = Sandbox::new();
        scrip(&sandbox)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("scrip"));
    }

    #[test]
    fn cache_list_empty() {
        let sandbox = Sandbox::new();
        scrip(&sandbox)
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached programs"));
        assert!(sandbox.cache_dir().join("registry.db").exists());
    }

    #[test]
    fn cache_list_formats() {
        let sandbox = Sandbox::new();
        let key = seed_entry(&sandbox, b"listed", 2);

        scrip(&sandbox)
            .args(["cache", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(format!("{}\n", key));

        scrip(&sandbox)
            .args(["cache", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"artifact\": \"built\""))
            .stdout(predicate::str::contains(key.as_str()));

        scrip(&sandbox)
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains(key.short()))
            .stdout(predicate::str::contains("2d ago"));
    }

    #[test]
    fn config_path_follows_flag() {
        let sandbox = Sandbox::new();
        scrip(&sandbox)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_set_then_show() {
        let sandbox = Sandbox::new();
        scrip(&sandbox)
            .args(["config", "set", "cache.gc_days", "30"])
            .assert()
            .success();

        // SCRIP_PATH from the environment is not written to the file
        let written = std::fs::read_to_string(sandbox.config_path()).unwrap();
        assert!(written.contains("gc_days = 30"));
        assert!(!written.contains("dir ="));

        scrip(&sandbox)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("gc_days = 30"));
    }

    #[test]
    fn config_set_unknown_key_fails() {
        let sandbox = Sandbox::new();
        scrip(&sandbox)
            .args(["config", "set", "cache.size", "1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown config key"));
    }

    #[test]
    fn invalid_cleanup_days_fails() {
        let sandbox = Sandbox::new();
        scrip(&sandbox)
            .env("SCRIP_CLEANUP_DAYS", "soon")
            .args(["cache", "list"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("SCRIP_CLEANUP_DAYS"));
    }

    #[test]
    fn run_without_script_fails_with_hint() {
        let sandbox = Sandbox::new();
        scrip(&sandbox)
            .arg("run")
            .assert()
            .failure()
            .stderr(predicate::str::contains("No script given"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn run_missing_script_file_fails() {
        let sandbox = Sandbox::new();
        scrip(&sandbox)
            .args(["run", "does-not-exist.go"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to read script"));
    }

    #[test]
    fn run_without_toolchain_fails_and_unlocks() {
        let sandbox = Sandbox::new();
        sandbox.write_config("[build]\ngo = \"scrip-test-no-such-go\"\n");

        scrip(&sandbox)
            .args(["run", "-c", "P(1)"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Required tool not found"));

        // The failed build leaves an unlocked row and no artifact
        scrip(&sandbox)
            .args(["cache", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"writer_held\": false"))
            .stdout(predicate::str::contains("\"artifact\": \"absent\""));
    }

    #[test]
    fn cache_info_for_inline_code() {
        let sandbox = Sandbox::new();
        scrip(&sandbox)
            .args(["cache", "info", "-c", "P(1)"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Key"))
            .stdout(predicate::str::contains("not cached"));
    }

    #[test]
    fn cache_unlock_rejects_bad_key() {
        let sandbox = Sandbox::new();
        scrip(&sandbox)
            .args(["cache", "unlock", "../etc"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid cache key"));
    }

    #[test]
    fn cache_unlock_resets_leaked_lease() {
        let sandbox = Sandbox::new();
        let registry = Registry::open(&sandbox.cache_dir()).unwrap();
        let key = CacheKey::derive(b"leaked");
        // Simulates a writer that crashed without releasing
        std::mem::forget(WriteLease::acquire(&registry, &key).unwrap());

        scrip(&sandbox)
            .args(["cache", "unlock", key.short()])
            .assert()
            .success()
            .stdout(predicate::str::contains("Unlocked"));

        let lease = WriteLease::acquire(&registry, &key).unwrap();
        lease.release().unwrap();
    }

    #[test]
    fn cache_gc_removes_old_programs() {
        let sandbox = Sandbox::new();
        let old = seed_entry(&sandbox, b"old", 100);
        let fresh = seed_entry(&sandbox, b"fresh", 1);

        scrip(&sandbox)
            .args(["cache", "gc", "--dry-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Dry run"));
        assert!(ArtifactStore::new(&sandbox.cache_dir()).dir(&old).exists());

        scrip(&sandbox)
            .args(["cache", "gc"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 1 program(s)"));

        let store = ArtifactStore::new(&sandbox.cache_dir());
        assert!(!store.dir(&old).exists());
        assert!(store.dir(&fresh).exists());
    }

    #[test]
    fn cache_gc_disabled_by_environment() {
        let sandbox = Sandbox::new();
        seed_entry(&sandbox, b"old", 100);

        scrip(&sandbox)
            .env("SCRIP_CLEANUP_DAYS", "0")
            .args(["cache", "gc"])
            .assert()
            .success()
            .stdout(predicate::str::contains("disabled"));
    }

    #[test]
    fn cache_verify_reports_orphans() {
        let sandbox = Sandbox::new();
        scrip(&sandbox).args(["cache", "verify"]).assert().success();

        let store = ArtifactStore::new(&sandbox.cache_dir());
        std::fs::create_dir_all(store.dir(&CacheKey::derive(b"orphan"))).unwrap();

        scrip(&sandbox)
            .args(["cache", "verify"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("integrity violation"));
    }

    #[test]
    fn cache_clear_requires_confirmation() {
        let sandbox = Sandbox::new();
        seed_entry(&sandbox, b"a", 0);
        seed_entry(&sandbox, b"b", 0);

        scrip(&sandbox)
            .args(["cache", "clear"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Aborted"));

        scrip(&sandbox)
            .args(["cache", "clear", "-y"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 2 program(s)"));

        let registry = Registry::open(&sandbox.cache_dir()).unwrap();
        assert!(registry.list().unwrap().is_empty());
    }

    #[test]
    fn completions_generate() {
        let sandbox = Sandbox::new();
        scrip(&sandbox)
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("scrip"));
    }

    #[test]
    fn run_compiles_once_and_propagates_exit_code() {
        if !go_installed() {
            return;
        }
        let sandbox = Sandbox::new();

        scrip(&sandbox)
            .args(["run", "-c", "P(\"hello\", len(os.Args))", "--", "x"])
            .assert()
            .success()
            .stdout("hello 2\n");

        scrip(&sandbox)
            .args(["run", "-c", "P(\"hello\", len(os.Args))", "--", "x"])
            .assert()
            .success()
            .stdout("hello 2\n");

        scrip(&sandbox)
            .args(["cache", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::is_match("^[0-9a-f]{64}\n$").unwrap());

        scrip(&sandbox)
            .args(["run", "-c", "os.Exit(3)"])
            .assert()
            .code(3);
    }

    #[test]
    fn run_reports_compile_errors_against_user_lines() {
        if !go_installed() {
            return;
        }
        let sandbox = Sandbox::new();
        let script = sandbox.dir.path().join("broken.go");
        std::fs::write(
            &script,
            "#!/usr/bin/env -S scrip run\nx := 1\nP(undefinedThing)\n",
        )
        .unwrap();

        scrip(&sandbox)
            .arg("run")
            .arg(&script)
            .assert()
            .failure()
            .stderr(predicate::str::contains("undefined: undefinedThing (line 3)"));
    }
}

mod concurrency_tests {
    use super::Sandbox;
    use scrip::cache::{CacheKey, ReadLease, Registry, WriteLease};
    use std::sync::{Arc, Barrier};
    use std::thread;

    const WORKERS: usize = 8;

    #[test]
    fn only_one_writer_wins() {
        let sandbox = Sandbox::new();
        Registry::open(&sandbox.cache_dir()).unwrap();
        let key = CacheKey::derive(b"contended");
        let barrier = Arc::new(Barrier::new(WORKERS));

        let handles: Vec<_> = (0..WORKERS)
            .map(|_| {
                let dir = sandbox.cache_dir();
                let key = key.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    // Each worker stands in for an unrelated process
                    let registry = Registry::open(&dir).unwrap();
                    barrier.wait();
                    let result = WriteLease::acquire(&registry, &key);
                    let won = match &result {
                        Ok(_) => true,
                        Err(e) => {
                            assert!(e.is_contention(), "unexpected error: {e}");
                            false
                        }
                    };
                    // Hold until everyone has tried
                    barrier.wait();
                    if let Ok(lease) = result {
                        lease.release().unwrap();
                    }
                    won
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);

        let registry = Registry::open(&sandbox.cache_dir()).unwrap();
        let entry = registry.get(&key).unwrap().unwrap();
        assert!(!entry.state().is_locked());
    }

    #[test]
    fn concurrent_readers_all_succeed() {
        let sandbox = Sandbox::new();
        Registry::open(&sandbox.cache_dir()).unwrap();
        let key = CacheKey::derive(b"shared");
        let barrier = Arc::new(Barrier::new(WORKERS + 1));

        let handles: Vec<_> = (0..WORKERS)
            .map(|_| {
                let dir = sandbox.cache_dir();
                let key = key.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let registry = Registry::open(&dir).unwrap();
                    let lease = ReadLease::acquire(&registry, &key).unwrap();
                    barrier.wait();
                    barrier.wait();
                    lease.release().unwrap();
                })
            })
            .collect();

        barrier.wait();
        let registry = Registry::open(&sandbox.cache_dir()).unwrap();
        let entry = registry.get(&key).unwrap().unwrap();
        assert_eq!(entry.reader_count, WORKERS as u32);
        assert!(WriteLease::acquire(&registry, &key)
            .unwrap_err()
            .is_contention());
        barrier.wait();

        for handle in handles {
            handle.join().unwrap();
        }
        let entry = registry.get(&key).unwrap().unwrap();
        assert_eq!(entry.reader_count, 0);
        assert!(!entry.writer_held);
    }
}
