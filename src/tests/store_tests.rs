#[cfg(test)]
mod store_tests {
    use crate::footprint::Label;
    use crate::process::PipelineError;
    use crate::store::{
        export_for_classifier, MemoryStore, StatStore, SubpopSlot, NULL_SENTINEL,
    };
    use crate::tests::common::stat_row;

    use std::fs;

    #[test]
    fn test_upsert_is_keyed_not_append() {
        let mut store = MemoryStore::new();
        let rows = vec![stat_row("sim_a", 100), stat_row("sim_a", 200)];
        store.upsert_rows(&rows).unwrap();
        assert_eq!(store.len(), 2);

        // Reprocessing the same batch must be safe.
        let mut replayed = rows.clone();
        replayed[0].xpehh = Some(9.0);
        store.upsert_rows(&replayed).unwrap();
        assert_eq!(store.len(), 2);
        let row = &store.rows_for_simulation("sim_a")[0];
        assert_eq!(row.xpehh, Some(9.0));
    }

    #[test]
    fn test_uniq_id_with_underscored_simulation_name() {
        let mut store = MemoryStore::new();
        store
            .upsert_rows(&[stat_row("ts_sweep_12.vcf", 4_200)])
            .unwrap();
        store
            .update_standardized(
                SubpopSlot::Pop1,
                &[("ts_sweep_12.vcf_4200".to_string(), Some(1.5))],
            )
            .unwrap();
        let row = &store.rows_for_simulation("ts_sweep_12.vcf")[0];
        assert_eq!(row.ihs_pop1_std, Some(1.5));
    }

    #[test]
    fn test_update_standardized_unknown_id_fails() {
        let mut store = MemoryStore::new();
        store.upsert_rows(&[stat_row("sim_a", 100)]).unwrap();
        let result =
            store.update_standardized(SubpopSlot::Pop2, &[("sim_b_100".to_string(), Some(0.0))]);
        assert!(matches!(result, Err(PipelineError::Storage(_))));
    }

    #[test]
    fn test_update_standardized_is_all_or_nothing() {
        let mut store = MemoryStore::new();
        store
            .upsert_rows(&[stat_row("sim_a", 100), stat_row("sim_a", 200)])
            .unwrap();
        let result = store.update_standardized(
            SubpopSlot::Pop1,
            &[
                ("sim_a_100".to_string(), Some(2.0)),
                ("sim_missing_1".to_string(), Some(3.0)),
            ],
        );
        assert!(result.is_err());
        // The good id must not have been written before the bad one failed.
        assert!(store.all_rows().iter().all(|r| r.ihs_pop1_std.is_none()));
    }

    #[test]
    fn test_update_labels_is_all_or_nothing() {
        let mut store = MemoryStore::new();
        store.upsert_rows(&[stat_row("sim_a", 100)]).unwrap();
        let result = store.update_labels(&[
            ("sim_a_100".to_string(), Label::Sweep),
            ("sim_missing_1".to_string(), Label::Neutral),
        ]);
        assert!(result.is_err());
        // The bad id must not leave the store partially relabeled.
        assert_eq!(store.all_rows()[0].label, Label::Neutral);
    }

    #[test]
    fn test_range_and_label_queries() {
        let mut store = MemoryStore::new();
        let mut sweep_row = stat_row("sim_a", 2_500_000);
        sweep_row.label = Label::Sweep;
        store
            .upsert_rows(&[stat_row("sim_a", 100), sweep_row, stat_row("sim_b", 300)])
            .unwrap();
        assert_eq!(store.rows_in_range(50, 350).len(), 2);
        assert_eq!(store.rows_with_label(Label::Sweep).len(), 1);
        assert_eq!(store.rows_for_simulation("sim_b").len(), 1);
    }

    #[test]
    fn test_export_writes_sentinel_never_empty() {
        let mut store = MemoryStore::new();
        let mut row = stat_row("sim_a", 100);
        row.xpehh = None;
        row.ihs_pop1_std = None;
        store.upsert_rows(&[row]).unwrap();

        let dir = tempfile::tempdir().unwrap();
        export_for_classifier(&store, dir.path(), "afr", 0).unwrap();

        let neutral = fs::read_to_string(dir.path().join("neutral")).unwrap();
        let mut lines = neutral.lines();
        let header = lines.next().unwrap();
        assert_eq!(header, "snp_position\tvcf_name\txpehh\tfst\tihs_afr_std");
        let data = lines.next().unwrap();
        let fields: Vec<&str> = data.split('\t').collect();
        assert_eq!(fields[0], "100");
        assert_eq!(fields[1], "sim_a");
        assert_eq!(fields[2], format!("{}", NULL_SENTINEL));
        assert_eq!(fields[4], format!("{}", NULL_SENTINEL));
        assert!(fields.iter().all(|f| !f.is_empty()));
    }

    #[test]
    fn test_export_splits_test_simulations() {
        let mut store = MemoryStore::new();
        store
            .upsert_rows(&[
                stat_row("sim_a", 100),
                stat_row("sim_b", 100),
                stat_row("sim_c", 100),
            ])
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        export_for_classifier(&store, dir.path(), "afr", 1).unwrap();

        // sim_a (first in sorted order) is held out for the test split.
        let test = fs::read_to_string(dir.path().join("test")).unwrap();
        assert!(test.contains("sim_a") && !test.contains("sim_b"));
        assert!(test.lines().next().unwrap().starts_with("label\t"));

        let neutral = fs::read_to_string(dir.path().join("neutral")).unwrap();
        assert!(!neutral.contains("sim_a"));
        assert!(neutral.contains("sim_b") && neutral.contains("sim_c"));

        let train = fs::read_to_string(dir.path().join("train")).unwrap();
        assert!(!train.contains("sim_a"));

        // Every label class gets a file even when empty.
        for name in ["neutral", "link_left", "sweep", "link_right"] {
            assert!(dir.path().join(name).exists(), "missing {}", name);
        }
    }
}
