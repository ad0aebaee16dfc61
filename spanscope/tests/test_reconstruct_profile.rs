use std::path::PathBuf;

use spanscope::domain::{Config, ContextId, ProfileError, RunError, Timestamp};
use spanscope::emitter::CollectingSink;
use spanscope::engine::Engine;
use spanscope::filter::FrameFilter;
use spanscope::profile::{load_profile, reconstruct};
use spanscope::span::{CloseReason, Span};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn run(filter: FrameFilter) -> Vec<Span> {
    let profile = load_profile(fixture("request.cpuprofile")).expect("Failed to load fixture");
    let sink = CollectingSink::new();
    let mut engine = Engine::new(filter, sink.clone());
    engine.run_profile(&profile).expect("Failed to run profile");
    sink.take()
}

fn find<'a>(spans: &'a [Span], name: &str) -> &'a Span {
    spans.iter().find(|s| s.name.as_str() == name).unwrap_or_else(|| panic!("no span named {name}"))
}

#[test]
fn test_reconstructs_request_profile() {
    let spans = run(FrameFilter::with_defaults());

    let names: Vec<&str> = spans.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["queryDb", "renderTemplate", "handleRequest", "(anonymous)", "main"]);

    let main = find(&spans, "main");
    assert_eq!(main.start, Timestamp::from_micros(1_100));
    assert_eq!(main.end, Some(Timestamp::from_micros(1_700)));
    assert_eq!(main.parent, None);

    // The GC sample in the middle is filtered, so queryDb stays open across it
    let query = find(&spans, "queryDb");
    assert_eq!(query.start, Timestamp::from_micros(1_200));
    assert_eq!(query.end, Some(Timestamp::from_micros(1_500)));

    let handler = find(&spans, "handleRequest");
    assert_eq!(query.parent, Some(handler.id));
    assert_eq!(handler.parent, Some(main.id));
    assert_eq!(find(&spans, "(anonymous)").parent, Some(main.id));

    assert!(spans.iter().all(|s| s.context == ContextId(0)));
    assert!(spans.iter().all(|s| s.closed_by == Some(CloseReason::Sampled)));
}

#[test]
fn test_pass_through_filter_keeps_engine_frames() {
    let spans = run(FrameFilter::pass_through());

    let gc = find(&spans, "(garbage collector)");
    assert_eq!(gc.depth, 3);
    assert_eq!(gc.start, Timestamp::from_micros(1_300));
    assert_eq!(gc.end, Some(Timestamp::from_micros(1_400)));

    // Still open at the end of the profile: closed by the final flush
    let program = find(&spans, "(program)");
    assert_eq!(program.end, Some(Timestamp::from_micros(2_000)));
    assert_eq!(program.closed_by, Some(CloseReason::Flush));

    // The GC frame nests under queryDb instead of interrupting it
    assert_eq!(gc.parent, Some(find(&spans, "queryDb").id));
    assert_eq!(spans.iter().filter(|s| s.name.as_str() == "queryDb").count(), 1);
    assert_eq!(find(&spans, "queryDb").end, Some(Timestamp::from_micros(1_500)));
}

#[test]
fn test_reconstruction_is_deterministic() {
    let profile = load_profile(fixture("request.cpuprofile")).unwrap();
    assert_eq!(reconstruct(&profile).unwrap(), reconstruct(&profile).unwrap());
    assert_eq!(run(FrameFilter::with_defaults()), run(FrameFilter::with_defaults()));
}

#[test]
fn test_every_span_nests_inside_its_parent() {
    let spans = run(FrameFilter::pass_through());
    for span in &spans {
        let Some(parent_id) = span.parent else { continue };
        let parent = spans.iter().find(|s| s.id == parent_id).expect("parent was emitted");
        assert!(parent.start <= span.start, "{} starts before {}", span.name, parent.name);
        assert!(parent.end >= span.end, "{} ends after {}", span.name, parent.name);
        assert_eq!(parent.depth + 1, span.depth);
    }
}

#[test]
fn test_cyclic_profile_is_rejected_whole() {
    let profile = load_profile(fixture("cyclic.cpuprofile")).unwrap();
    assert!(matches!(reconstruct(&profile), Err(ProfileError::Cycle(_))));

    let sink = CollectingSink::new();
    let mut engine = Engine::from_config(&Config::default(), sink.clone()).unwrap();
    let err = engine.run_profile(&profile).unwrap_err();
    assert!(matches!(err, RunError::Profile(ProfileError::Cycle(_))));
    assert!(sink.is_empty());
    assert_eq!(engine.context_count(), 0);
}
