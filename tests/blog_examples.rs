//! End-to-end runs of the blog post scenarios.
//!
//! Step definitions are the canonical wordings; scenarios use paraphrases that
//! no regex matches. The oracle is scripted so runs are deterministic.

use std::sync::{Arc, Mutex};

use semstep::{
    CaptureArgument, FallbackMatcher, HandlerResult, MatchEngine, MatchSource, MatcherConfig,
    PatternCatalog, RawOracleResponse, ScriptedOracle, StepError, StepRunner,
};

const LOGGED_IN: &str = "/^the user has logged in to their account$/";
const CLICK: &str = r#"/^they click the "([^"]*)" button$/"#;
const CONFIRMATION: &str = "/^they should see a confirmation message$/";

#[derive(Debug, Default)]
struct World {
    logged_in: bool,
    clicked: Option<String>,
    confirmation_shown: bool,
}

fn scripted_oracle() -> ScriptedOracle {
    let table: &[(&str, &str, &str, &str)] = &[
        ("the user has signed in to their account", LOGGED_IN, "0.9", ""),
        ("the user has authenticated successfully", LOGGED_IN, "0.85", ""),
        (r#"they press the "Buy Now" button"#, CLICK, "0.9", "Buy Now"),
        (r#"they tap the "Buy Now" button"#, CLICK, "0.88", "Buy Now"),
        ("they hit the purchase button", CLICK, "0.82", "Buy Now"),
        ("they mash the buy button", CLICK, "0.75", "Buy Now"),
        (r#"they gently caresses the "Buy Now" button"#, CLICK, "0.72", "Buy Now"),
        ("they should view a confirmation message", CONFIRMATION, "0.92", ""),
        ("they receive a success notification", CONFIRMATION, "0.8", ""),
        ("they get a notification", CONFIRMATION, "0.78", ""),
        // Below the default threshold.
        ("they glance at the screen", CONFIRMATION, "0.5", ""),
    ];

    table
        .iter()
        .fold(ScriptedOracle::new(), |oracle, (query, pattern, confidence, params)| {
            oracle.with_response(*query, RawOracleResponse::matched(*pattern, *confidence, *params))
        })
}

fn runner(world: &Arc<Mutex<World>>) -> StepRunner {
    let config = MatcherConfig::default().with_cache_enabled(false);
    let engine = MatchEngine::from_config(&config, Arc::new(scripted_oracle())).unwrap();
    let runner = StepRunner::new(PatternCatalog::new()).with_fallback(Arc::new(engine));

    let w = Arc::clone(world);
    runner
        .define(LOGGED_IN, move |_: &[CaptureArgument]| -> HandlerResult {
            w.lock().unwrap().logged_in = true;
            Ok(())
        })
        .unwrap();

    let w = Arc::clone(world);
    runner
        .define(CLICK, move |args: &[CaptureArgument]| -> HandlerResult {
            let button = args.first().ok_or("missing button name")?;
            w.lock().unwrap().clicked = Some(button.value.clone());
            Ok(())
        })
        .unwrap();

    let w = Arc::clone(world);
    runner
        .define(CONFIRMATION, move |_: &[CaptureArgument]| -> HandlerResult {
            w.lock().unwrap().confirmation_shown = true;
            Ok(())
        })
        .unwrap();

    runner
        .define("/^semstep is configured for testing$/", |_: &[CaptureArgument]| -> HandlerResult {
            Ok(())
        })
        .unwrap();

    let w = Arc::clone(world);
    runner
        .define(
            r#"/^the button interaction step should have executed with "([^"]*)"$/"#,
            move |args: &[CaptureArgument]| -> HandlerResult {
                let expected = args.first().map(CaptureArgument::as_str);
                let actual = w.lock().unwrap().clicked.clone();
                if actual.as_deref() == expected {
                    Ok(())
                } else {
                    Err(format!("expected {expected:?}, clicked {actual:?}"))
                }
            },
        )
        .unwrap();

    runner
}

#[test]
fn paraphrased_purchase_scenario_runs() {
    let world = Arc::new(Mutex::new(World::default()));
    let runner = runner(&world);

    runner.run("semstep is configured for testing").unwrap();

    let login = runner.run("the user has signed in to their account").unwrap();
    assert!(login.is_fallback());
    assert!(login.arguments.is_empty());

    let click = runner.run(r#"they press the "Buy Now" button"#).unwrap();
    assert_eq!(click.pattern.raw_source(), CLICK);
    assert_eq!(click.arguments[0].as_str(), "Buy Now");

    runner.run("they should view a confirmation message").unwrap();
    runner
        .run(r#"the button interaction step should have executed with "Buy Now""#)
        .unwrap();

    let world = world.lock().unwrap();
    assert!(world.logged_in);
    assert!(world.confirmation_shown);
    assert_eq!(world.clicked.as_deref(), Some("Buy Now"));
}

#[test]
fn every_scripted_variation_resolves() {
    let world = Arc::new(Mutex::new(World::default()));
    let runner = runner(&world);

    for (text, expected) in [
        ("the user has authenticated successfully", LOGGED_IN),
        (r#"they tap the "Buy Now" button"#, CLICK),
        ("they hit the purchase button", CLICK),
        ("they mash the buy button", CLICK),
        (r#"they gently caresses the "Buy Now" button"#, CLICK),
        ("they receive a success notification", CONFIRMATION),
        ("they get a notification", CONFIRMATION),
    ] {
        let step = runner.run(text).unwrap();
        assert_eq!(step.pattern.raw_source(), expected, "for {text:?}");
    }
    assert_eq!(world.lock().unwrap().clicked.as_deref(), Some("Buy Now"));
}

#[test]
fn fallback_records_confidence_and_synthesized_text() {
    let world = Arc::new(Mutex::new(World::default()));
    let step = runner(&world)
        .resolve("they hit the purchase button")
        .unwrap();

    match step.source {
        MatchSource::Fallback {
            confidence,
            synthesized_text,
        } => {
            assert!((confidence.value() - 0.82).abs() < f32::EPSILON);
            assert_eq!(
                synthesized_text.as_deref(),
                Some(r#"they click the "Buy Now" button"#)
            );
        }
        MatchSource::Native => panic!("expected a fallback match"),
    }
}

#[test]
fn low_confidence_and_unknown_steps_stay_undefined() {
    let world = Arc::new(Mutex::new(World::default()));
    let runner = runner(&world);

    for text in ["they glance at the screen", "they order a pizza"] {
        match runner.run(text) {
            Err(StepError::Undefined { text: reported }) => assert_eq!(reported, text),
            other => panic!("expected undefined step for {text:?}, got {other:?}"),
        }
    }
    assert!(!world.lock().unwrap().confirmation_shown);
}

#[test]
fn verification_failure_surfaces_handler_message() {
    let world = Arc::new(Mutex::new(World::default()));
    let runner = runner(&world);

    let err = runner
        .run(r#"the button interaction step should have executed with "Buy Now""#)
        .unwrap_err();
    assert!(matches!(err, StepError::HandlerFailed { .. }));
}

#[test]
fn engine_works_directly_as_fallback_matcher() {
    let config = MatcherConfig::default().with_cache_enabled(false);
    let engine = MatchEngine::from_config(&config, Arc::new(scripted_oracle())).unwrap();
    let catalog = PatternCatalog::new();
    for source in [LOGGED_IN, CLICK, CONFIRMATION] {
        catalog
            .register(semstep::StepPattern::unbound(source).unwrap())
            .unwrap();
    }
    let patterns = catalog.all().unwrap();

    let m = engine
        .find_match("they should view a confirmation message", &patterns)
        .unwrap();
    assert_eq!(m.pattern.raw_source(), CONFIRMATION);
    assert!(m.captured_arguments.is_empty());

    assert!(engine.find_match("they glance at the screen", &patterns).is_none());

    let stats = engine.stats();
    assert_eq!(stats.lookups, 2);
    assert_eq!(stats.oracle_calls, 2);
    assert_eq!(stats.matches, 1);
    assert_eq!(stats.gate_rejections, 1);
}
