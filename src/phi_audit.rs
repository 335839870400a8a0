// Static check that scans every Rust source file for tracing calls that
// carry patient-identifying data. Logs must only ever carry opaque ids.

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    /// Field names and interpolations that would leak patient data.
    const PHI_PATTERNS: &[&str] = &[
        // Snapshot and directory fields
        "patient_name",
        "patient_email",
        "patient_phone",
        "full_name",
        "snapshot",
        "contact.name",
        "contact.email",
        "contact.phone",
        "patient.email",
        "patient.phone",
        "live.email",
        "live.phone",
        // Free text written by staff about the visit
        "no_show_reason",
        "price_adjustment_reason",
        "justification",
        "appt.reason",
        "appt.notes",
        "record.reason",
    ];

    /// Files allowed to mention the patterns outside tracing calls.
    const ALLOWLIST: &[&str] = &["phi_audit.rs"];

    const TRACING_MACROS: &[&str] = &[
        "tracing::info!",
        "tracing::warn!",
        "tracing::error!",
        "tracing::debug!",
        "tracing::trace!",
    ];

    #[test]
    fn no_phi_in_tracing_calls() {
        let src_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
        assert!(src_dir.exists(), "Source directory not found: {}", src_dir.display());

        let mut violations = Vec::new();
        scan_directory(&src_dir, &mut violations);

        if !violations.is_empty() {
            let report = violations
                .iter()
                .map(|(file, line_num, line, pattern)| {
                    format!("  {file}:{line_num}: found '{pattern}' in: {}", line.trim())
                })
                .collect::<Vec<_>>()
                .join("\n");
            panic!(
                "PHI audit failed: {} violation(s) in tracing calls:\n{report}\n\n\
                 Log appointment, practitioner or patient ids instead.",
                violations.len()
            );
        }
    }

    #[test]
    fn scanner_detects_known_violation() {
        let line = r#"tracing::info!(name = %appt.snapshot.name, "booked");"#;
        assert!(PHI_PATTERNS.iter().any(|p| line.contains(p)));
    }

    #[test]
    fn scanner_passes_clean_tracing() {
        let line = r#"tracing::info!(appointment_id = %appt.id, patient_id = ?appt.patient_id, "booked");"#;
        assert!(!PHI_PATTERNS.iter().any(|p| line.contains(p)));
    }

    #[test]
    fn multi_line_calls_are_joined() {
        let source = "tracing::info!(\n    appointment_id = %id,\n    email = %patient.email,\n    \"x\"\n);";
        let calls = tracing_calls(source);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, 1);
        assert!(calls[0].1.contains("patient.email"));
    }

    fn scan_directory(dir: &Path, violations: &mut Vec<(String, usize, String, String)>) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                scan_directory(&path, violations);
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                scan_file(&path, violations);
            }
        }
    }

    fn scan_file(path: &Path, violations: &mut Vec<(String, usize, String, String)>) {
        let filename = path.file_name().unwrap_or_default().to_string_lossy();
        if ALLOWLIST.iter().any(|a| filename.contains(a)) {
            return;
        }
        let Ok(content) = fs::read_to_string(path) else {
            return;
        };
        let relative = path
            .strip_prefix(Path::new(env!("CARGO_MANIFEST_DIR")).join("src"))
            .unwrap_or(path)
            .display()
            .to_string();

        for (line_num, call) in tracing_calls(&content) {
            for pattern in PHI_PATTERNS {
                if call.contains(pattern) {
                    violations.push((relative.clone(), line_num, call.clone(), pattern.to_string()));
                }
            }
        }
    }

    /// Every tracing macro invocation with its 1-based starting line,
    /// continuation lines joined until the parentheses balance.
    fn tracing_calls(content: &str) -> Vec<(usize, String)> {
        let lines: Vec<&str> = content.lines().collect();
        let mut calls = Vec::new();
        let mut i = 0;
        while i < lines.len() {
            let trimmed = lines[i].trim();
            if !TRACING_MACROS.iter().any(|m| trimmed.starts_with(m)) {
                i += 1;
                continue;
            }

            let mut call = String::from(trimmed);
            let mut depth = paren_balance(trimmed);
            let mut j = i + 1;
            while depth > 0 && j < lines.len() {
                let next = lines[j].trim();
                call.push(' ');
                call.push_str(next);
                depth += paren_balance(next);
                j += 1;
            }
            calls.push((i + 1, call));
            i = j;
        }
        calls
    }

    fn paren_balance(s: &str) -> i32 {
        s.chars().fold(0, |depth, ch| match ch {
            '(' => depth + 1,
            ')' => depth - 1,
            _ => depth,
        })
    }
}
