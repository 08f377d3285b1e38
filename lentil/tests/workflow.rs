use approx::assert_abs_diff_eq;
use lentil::simulate::{simulate_corpus, SimArgs};
use lentil::*;
use matrix_util::common_io::create_temp_dir_file;
use matrix_util::mtx_io::write_mtx_triplets;
use matrix_util::traits::IoOps;
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn sim_args(rseed: u64) -> SimArgs {
    SimArgs {
        docs: 50,
        terms: 30,
        topics: 3,
        doc_len: 120.0,
        vocab_conc: 0.05,
        topic_scale: 2.0,
        rseed,
    }
}

#[test]
fn mtx_corpus_round_trip() -> anyhow::Result<()> {
    let sim = simulate_corpus(&sim_args(1))?;
    let (_dir, mtx_file) = create_temp_dir_file(".mtx.gz")?;
    write_mtx_triplets(&sim.triplets, 50, 30, &mtx_file)?;

    let data = Dataset::from_mtx(&mtx_file, false)?;
    assert_eq!(data.doc_count(), 50);
    assert_eq!(data.term_count(), 30);
    assert_abs_diff_eq!(data.word_count(), sim.data.word_count());

    Ok(())
}

#[test]
fn term_by_document_file_transposed() -> anyhow::Result<()> {
    let (_dir, mtx_file) = create_temp_dir_file(".mtx")?;
    // 2 terms x 3 documents
    write_mtx_triplets(&[(0, 0, 2.0), (1, 1, 1.0), (0, 2, 4.0)], 2, 3, &mtx_file)?;

    let data = Dataset::from_mtx(&mtx_file, true)?;
    assert_eq!(data.doc_count(), 3);
    assert_eq!(data.term_count(), 2);
    assert_eq!(data.doc_lens().as_slice(), &[2.0, 1.0, 4.0]);
    Ok(())
}

#[test]
fn empty_document_in_file_rejected() -> anyhow::Result<()> {
    let (_dir, mtx_file) = create_temp_dir_file(".mtx")?;
    write_mtx_triplets(&[(0, 0, 2.0), (2, 1, 1.0)], 3, 2, &mtx_file)?;
    assert!(matches!(
        Dataset::from_mtx(&mtx_file, false),
        Err(TopicModelError::InvalidInput(_))
    ));
    Ok(())
}

#[test]
fn train_then_query_held_out() -> anyhow::Result<()> {
    let sim = simulate_corpus(&sim_args(2))?;
    let mut rng = StdRng::seed_from_u64(3);
    let (data, held) = sim.data.split_holdout(0.2, &mut rng)?;

    let model = ModelState::new_at_random(&data, &ModelConfig::new(3), &mut rng)?;
    let state = QueryState::new(&data, &model, &mut rng)?;
    let plan = TrainPlan {
        iterations: 40,
        ..Default::default()
    };
    let fit = train(&data, model, state, &plan)?;
    assert!(!fit.trace.is_empty());
    assert!(fit.trace.perplexities.iter().all(|p| p.is_finite()));

    let fresh = QueryState::new(&held, &fit.model, &mut rng)?;
    let before = perplexity(&held, &fit.model, &fresh)?;
    let out = query(&held, &fit.model, fresh, &QueryPlan::from(&plan))?;
    let after = perplexity(&held, &fit.model, &out.query)?;
    assert!(after < before, "{} -> {}", before, after);

    // trained topic weights are written as plain tsv
    let (_dir, tsv_file) = create_temp_dir_file(".tsv.gz")?;
    out.query.topic_dists().to_tsv(&tsv_file)?;
    let theta = DMatrix::<f64>::from_tsv(&tsv_file, None)?;
    assert_eq!(theta.shape(), (held.doc_count(), 3));
    for row in theta.row_iter() {
        assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-6);
    }
    Ok(())
}

#[test]
fn linked_documents_inform_the_prior() -> anyhow::Result<()> {
    let sim = simulate_corpus(&sim_args(4))?;
    // chain of neighbouring documents plus self links
    let mut triplets = vec![];
    for d in 0..50 {
        triplets.push((d, d, 1.0));
        if d + 1 < 50 {
            triplets.push((d, d + 1, 1.0));
        }
    }
    let links = matrix_util::sparse_util::csr_from_triplets(50, 50, &triplets)?;
    let data = sim.data.with_links(links)?;

    let config = ModelConfig {
        side_info: Some(SideInfoConfig::new(SideSource::Links, 2, 2)),
        ..ModelConfig::new(3)
    };
    let mut rng = StdRng::seed_from_u64(5);
    let model = ModelState::new_at_random(&data, &config, &mut rng)?;
    let state = QueryState::new(&data, &model, &mut rng)?;
    let fit = train(
        &data,
        model,
        state,
        &TrainPlan {
            iterations: 10,
            log_frequency: 1,
            ..Default::default()
        },
    )?;
    assert_eq!(fit.model.side().map(|s| s.num_side()), Some(50));
    assert!(var_bound(&data, &fit.model, &fit.query)?.is_finite());
    Ok(())
}

#[test]
fn side_model_needs_side_matrix() -> anyhow::Result<()> {
    let sim = simulate_corpus(&sim_args(6))?;
    let feats = matrix_util::sparse_util::csr_from_dense(&DMatrix::from_element(50, 3, 1.0))?;
    let data = sim.data.clone().with_feats(feats)?;

    let config = ModelConfig {
        side_info: Some(SideInfoConfig::new(SideSource::Features, 1, 1)),
        ..ModelConfig::new(3)
    };
    let mut rng = StdRng::seed_from_u64(7);
    let model = ModelState::new_at_random(&data, &config, &mut rng)?;
    assert!(QueryState::new(&sim.data, &model, &mut rng).is_err());
    Ok(())
}
