//! Plain-text rendering of sync and import results.

use medsync_core::{ImportResult, MatchType, MedicationSyncResult};

fn match_label(match_type: MatchType) -> &'static str {
    match match_type {
        MatchType::NameAndDosage => "name + dosage",
        MatchType::NameOnly => "name only",
    }
}

/// Joins report lines, each terminated by a newline.
fn finish(lines: Vec<String>) -> String {
    lines.into_iter().map(|line| line + "\n").collect()
}

/// Renders a reconciliation report. `wrote` tells whether write-back ran.
pub fn render_sync_report(result: &MedicationSyncResult, wrote: bool) -> String {
    let mut lines = vec![String::new(), result.summary(), String::new()];

    if !result.matched_medications.is_empty() {
        lines.push(format!("Matched ({}):", result.matched_medications.len()));
        lines.extend(result.matched_medications.iter().map(|m| {
            format!(
                "  ✓ {} {} [{}, {} record(s)]",
                m.app_medication.name,
                m.app_medication.dosage,
                match_label(m.match_type),
                m.health_records.len()
            )
        }));
        lines.push(String::new());
    }

    if !result.unmatched_health_records.is_empty() {
        lines.push(format!(
            "In health store only ({}):",
            result.unmatched_health_records.len()
        ));
        lines.extend(
            result
                .unmatched_health_records
                .iter()
                .map(|r| format!("  • {} {}", r.name, r.dosage)),
        );
        lines.push(String::new());
    }

    if !result.medications_to_write.is_empty() {
        let heading = if wrote { "Written to health store" } else { "To write to health store" };
        lines.push(format!("{} ({}):", heading, result.medications_to_write.len()));
        for (index, m) in result.medications_to_write.iter().enumerate() {
            let failed = result.write_failures.iter().find(|f| f.index == index);
            lines.push(match failed {
                Some(f) if wrote => format!("  ✗ {} {} ({})", m.name, m.dosage, f.error),
                _ => format!("  → {} {}", m.name, m.dosage),
            });
        }
        lines.push(String::new());
    }

    if wrote && !result.external_write_success {
        lines.push(format!(
            "Some writes failed ({} of {}).",
            result.write_failures.len(),
            result.medications_to_write.len()
        ));
    }

    finish(lines)
}

/// Renders the medications proposed for import into the app.
pub fn render_import_report(result: &ImportResult) -> String {
    let mut lines = vec![String::new(), result.summary(), String::new()];

    lines.extend(
        result
            .new_medications
            .iter()
            .map(|m| format!("  + {} {} ({})", m.name, m.dosage, m.frequency)),
    );
    if !result.new_medications.is_empty() {
        lines.push(String::new());
    }

    finish(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use medsync_core::{plan_import, reconcile, Medication, MedicationDoseRecord, WriteFailure};

    #[test]
    fn test_sync_report_sections() {
        let apps = vec![
            Medication::new("Aspirin", "81mg", "daily"),
            Medication::new("Metformin", "500mg", "twice daily"),
        ];
        let records = vec![MedicationDoseRecord::new("aspirin", "325mg", Utc::now())];
        let result = reconcile(&apps, &records);

        let text = render_sync_report(&result, false);
        assert!(text.contains("Matched: 1, New from External: 1, Written to External: 1"));
        assert!(text.contains("Aspirin 81mg [name only, 0 record(s)]"));
        assert!(text.contains("• aspirin 325mg"));
        assert!(text.contains("To write to health store (1):"));
        assert!(text.contains("→ Metformin 500mg"));
        assert!(!text.contains("Some writes failed"));
    }

    #[test]
    fn test_sync_report_failures() {
        let apps = vec![Medication::new("Metformin", "500mg", "twice daily")];
        let mut result = reconcile(&apps, &[]);
        result.write_failures = vec![WriteFailure {
            index: 0,
            medication_name: "Metformin".to_string(),
            error: "rejected".to_string(),
        }];

        let text = render_sync_report(&result, true);
        assert!(text.contains("Written to health store (1):"));
        assert!(text.contains("✗ Metformin 500mg (rejected)"));
        assert!(text.contains("Some writes failed (1 of 1)."));
    }

    #[test]
    fn test_sync_report_failure_marks_only_its_entry() {
        let apps = vec![
            Medication::new("Prednisone", "20mg", "morning"),
            Medication::new("Prednisone", "5mg", "evening"),
        ];
        let mut result = reconcile(&apps, &[]);
        result.external_write_success = false;
        result.write_failures = vec![WriteFailure {
            index: 1,
            medication_name: "Prednisone".to_string(),
            error: "rejected".to_string(),
        }];

        let text = render_sync_report(&result, true);
        assert!(text.contains("→ Prednisone 20mg"));
        assert!(text.contains("✗ Prednisone 5mg (rejected)"));
        assert_eq!(text.matches('✗').count(), 1);
        assert!(text.contains("Some writes failed (1 of 2)."));
    }

    #[test]
    fn test_import_report() {
        let external = vec![medsync_core::ExternalMedication {
            display_name: "Warfarin".to_string(),
            dosage_string: Some("5mg".to_string()),
            ..Default::default()
        }];
        let result = plan_import(&[], &external);

        let text = render_import_report(&result);
        assert!(text.contains("Found 1 medications in external store. 1 new, 0 already in app."));
        assert!(text.contains("+ Warfarin 5mg (As prescribed)"));
    }
}
