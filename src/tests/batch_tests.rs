#[cfg(test)]
mod batch_tests {
    use crate::process::{
        compute_simulation_rows, partition_batches, run_ingestion, PipelineError, RawSimulation,
        SimulationSource,
    };
    use crate::store::{MemoryStore, StatStore};
    use crate::tests::common::{pair, random_simulation, site, test_config};

    use std::collections::HashSet;

    /// In-memory simulation source; ids containing "poison" fail the whole
    /// batch load they appear in.
    struct VecSource {
        simulations: Vec<RawSimulation>,
    }

    impl SimulationSource for VecSource {
        fn simulation_ids(&self) -> Result<Vec<String>, PipelineError> {
            Ok(self.simulations.iter().map(|s| s.name.clone()).collect())
        }

        fn load(&self, ids: &[String]) -> Result<Vec<RawSimulation>, PipelineError> {
            if ids.iter().any(|id| id.contains("poison")) {
                return Err(PipelineError::Parse("poisoned batch".to_string()));
            }
            Ok(self
                .simulations
                .iter()
                .filter(|s| ids.contains(&s.name))
                .cloned()
                .collect())
        }
    }

    #[test]
    fn test_batch_partition_covers_corpus_exactly_once() {
        let ids: Vec<String> = (0..103).map(|i| format!("sim_{}", i)).collect();
        let batches = partition_batches(&ids, 50);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 50);
        assert_eq!(batches[1].len(), 50);
        assert_eq!(batches[2].len(), 3);

        let mut seen = HashSet::new();
        for batch in &batches {
            assert!(!batch.is_empty());
            for id in *batch {
                assert!(seen.insert(id.clone()), "duplicate {}", id);
            }
        }
        assert_eq!(seen.len(), ids.len());
    }

    #[test]
    fn test_batch_partition_even_and_oversized() {
        let ids: Vec<String> = (0..100).map(|i| format!("sim_{}", i)).collect();
        assert_eq!(partition_batches(&ids, 50).len(), 2);
        assert_eq!(partition_batches(&ids, 1_000).len(), 1);
    }

    #[test]
    fn test_one_row_per_surviving_site() {
        let subpops = pair(4, 4);
        let config = test_config(subpops.clone());
        let sim = random_simulation("sim_a", 30, &subpops, 3);
        let (rows, masked) = compute_simulation_rows(&sim, &config).unwrap();
        assert_eq!(rows.len() + masked, 30);
        for row in &rows {
            assert_eq!(row.uniq_id, format!("sim_a_{}", row.position));
            let pop1_total: u32 = row.pop1_ac.iter().sum();
            let pop2_total: u32 = row.pop2_ac.iter().sum();
            assert_eq!(pop1_total, 8);
            assert_eq!(pop2_total, 8);
        }
    }

    #[test]
    fn test_ihs_fault_isolation_within_batch() {
        let subpops = pair(4, 4);
        let config = test_config(subpops.clone());

        // Every site of the degenerate simulation has a single derived
        // carrier in pop1 and none in pop2, so iHS fails on both columns
        // while the sites stay polymorphic.
        let degenerate = RawSimulation {
            name: "sim_degenerate".to_string(),
            sites: (0..10)
                .map(|s| {
                    let mut calls = vec![0u8; subpops.total_call_columns()];
                    calls[0] = 1;
                    site(1_000 * (s + 1), calls)
                })
                .collect(),
        };
        let healthy = random_simulation("sim_healthy", 30, &subpops, 5);

        let source = VecSource {
            simulations: vec![degenerate, healthy],
        };
        let mut store = MemoryStore::new();
        let summary = run_ingestion(&source, &mut store, &config).unwrap();
        assert_eq!(summary.simulations_processed, 2);
        assert_eq!(summary.simulations_skipped, 0);

        let bad_rows = store.rows_for_simulation("sim_degenerate");
        assert!(!bad_rows.is_empty());
        assert!(bad_rows.iter().all(|r| r.ihs_pop1.is_none()));

        // The sibling simulation in the same batch keeps its values.
        let good_rows = store.rows_for_simulation("sim_healthy");
        assert!(good_rows.iter().any(|r| r.ihs_pop1.is_some()));
        assert!(good_rows.iter().any(|r| r.xpehh.is_some()));
    }

    #[test]
    fn test_malformed_simulation_skipped_batch_continues() {
        let subpops = pair(4, 4);
        let config = test_config(subpops.clone());
        let malformed = RawSimulation {
            name: "sim_malformed".to_string(),
            sites: vec![site(100, vec![0, 1])],
        };
        let healthy = random_simulation("sim_ok", 20, &subpops, 9);
        let source = VecSource {
            simulations: vec![malformed, healthy],
        };
        let mut store = MemoryStore::new();
        let summary = run_ingestion(&source, &mut store, &config).unwrap();
        assert_eq!(summary.simulations_skipped, 1);
        assert_eq!(summary.simulations_processed, 1);
        assert!(store.rows_for_simulation("sim_malformed").is_empty());
        assert!(!store.rows_for_simulation("sim_ok").is_empty());
    }

    #[test]
    fn test_batch_load_failure_aborts_only_that_batch() {
        let subpops = pair(4, 4);
        let mut config = test_config(subpops.clone());
        config.batch_size = 1;

        let source = VecSource {
            simulations: vec![
                random_simulation("sim_a", 15, &subpops, 1),
                random_simulation("sim_poison", 15, &subpops, 2),
                random_simulation("sim_z", 15, &subpops, 3),
            ],
        };
        let mut store = MemoryStore::new();
        let summary = run_ingestion(&source, &mut store, &config).unwrap();
        assert_eq!(summary.batches_failed, 1);
        assert_eq!(summary.batches_committed, 2);
        assert!(store.rows_for_simulation("sim_poison").is_empty());
        assert!(!store.rows_for_simulation("sim_a").is_empty());
        assert!(!store.rows_for_simulation("sim_z").is_empty());
    }

    #[test]
    fn test_reingesting_does_not_duplicate_rows() {
        let subpops = pair(4, 4);
        let config = test_config(subpops.clone());
        let source = VecSource {
            simulations: vec![
                random_simulation("sim_a", 20, &subpops, 21),
                random_simulation("sim_b", 20, &subpops, 22),
            ],
        };
        let mut store = MemoryStore::new();
        run_ingestion(&source, &mut store, &config).unwrap();
        let first_len = store.len();
        run_ingestion(&source, &mut store, &config).unwrap();
        assert_eq!(store.len(), first_len);
    }

    #[test]
    fn test_empty_corpus_is_an_error() {
        let source = VecSource {
            simulations: Vec::new(),
        };
        let mut store = MemoryStore::new();
        let config = test_config(pair(4, 4));
        assert!(matches!(
            run_ingestion(&source, &mut store, &config),
            Err(PipelineError::CorpusIncomplete(_))
        ));
    }
}
