use std::sync::Arc;

use serde_json::{json, Value};

use monitor_worker::pipeline::stage::{DeliverInput, FilterInput, HydrateInput, SearchInput};
use monitor_worker::pipeline::{StageJob, StageRequest};
use monitor_worker::testing::{post, task_payload, MockFilter, MockSearcher, RecordingNotifier};
use monitor_worker::{Pipeline, PipelineStats, StageOutcome};

struct Harness {
    searcher: Arc<MockSearcher>,
    filter: Arc<MockFilter>,
    notifier: Arc<RecordingNotifier>,
    stats: Arc<PipelineStats>,
    pipeline: Pipeline,
}

fn harness(searcher: MockSearcher, filter: MockFilter, notifier: RecordingNotifier) -> Harness {
    let searcher = Arc::new(searcher);
    let filter = Arc::new(filter);
    let notifier = Arc::new(notifier);
    let stats = Arc::new(PipelineStats::new());
    let pipeline = Pipeline::new(searcher.clone(), filter.clone(), notifier.clone(), stats.clone());
    Harness {
        searcher,
        filter,
        notifier,
        stats,
        pipeline,
    }
}

fn job(request: StageRequest) -> StageJob {
    StageJob {
        talkback: "orchestrator:50051".to_string(),
        slug: "news-desk".to_string(),
        request,
    }
}

fn resolve(name: &str, context: Value) -> StageJob {
    let payload = task_payload(name, "news-desk", "orchestrator:50051", context);
    StageJob::resolve(serde_json::from_str(&payload).unwrap()).unwrap()
}

#[tokio::test]
async fn search_reports_deduplicated_posts() {
    let h = harness(
        MockSearcher::new()
            .on_term("flood", vec![post("c1", "River over the banks"), post("c2", "Sandbags")])
            .on_term("storm", vec![post("c2", "Sandbags"), post("c3", "Power out")]),
        MockFilter::returning(json!({})),
        RecordingNotifier::new(),
    );

    let outcome = h
        .pipeline
        .run(resolve(
            "MonitorBluesky",
            json!({ "metadata": { "keywords": ["flood", "storm"], "since": 600 } }),
        ))
        .await;
    assert_eq!(outcome, StageOutcome::Reported);

    assert_eq!(h.searcher.calls(), vec![(vec!["flood".to_string(), "storm".to_string()], 600)]);
    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].stage, "MonitorBluesky");
    assert_eq!(sent[0].slug, "news-desk");
    assert_eq!(sent[0].url, "orchestrator:50051");
    let cids: Vec<&str> = sent[0]
        .output
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["cid"].as_str().unwrap())
        .collect();
    assert_eq!(cids, vec!["c1", "c2", "c3"]);
}

#[tokio::test]
async fn empty_keywords_skip_search_and_talkback() {
    let h = harness(MockSearcher::new(), MockFilter::returning(json!({})), RecordingNotifier::new());

    for context in [json!({}), json!({ "metadata": { "keywords": [] } }), json!({ "metadata": { "keyword": "  " } })] {
        let outcome = h.pipeline.run(resolve("MonitorBluesky", context)).await;
        assert!(matches!(outcome, StageOutcome::Skipped(_)));
    }
    let outcome = h.pipeline.run(resolve("TuttiMonitor", json!({ "metadata": null }))).await;
    assert!(matches!(outcome, StageOutcome::Skipped(_)));

    assert!(h.searcher.calls().is_empty());
    assert!(h.filter.screened().is_empty());
    assert!(h.notifier.sent().is_empty());
    assert_eq!(h.stats.snapshot().stages["MonitorBluesky"].skipped, 3);
}

#[tokio::test]
async fn filter_reduces_array_output_to_first_element() {
    let h = harness(
        MockSearcher::new(),
        MockFilter::returning(json!([{ "cids": ["c1"], "breaking": [], "keywords": ["weather/flood"] }, { "cids": ["x"] }])),
        RecordingNotifier::new(),
    );

    let outcome = h
        .pipeline
        .run(job(StageRequest::Filter(FilterInput {
            posts: vec![post("c1", "Flooding downtown")],
        })))
        .await;
    assert_eq!(outcome, StageOutcome::Reported);

    assert_eq!(h.filter.screened(), vec![vec!["c1".to_string()]]);
    let sent = h.notifier.sent();
    assert_eq!(sent[0].stage, "MonitorGemini");
    assert_eq!(
        sent[0].output,
        json!({ "cids": ["c1"], "breaking": [], "keywords": ["weather/flood"] })
    );
}

#[tokio::test]
async fn filter_without_posts_reports_empty_object() {
    let h = harness(MockSearcher::new(), MockFilter::returning(json!({ "cids": ["c1"] })), RecordingNotifier::new());

    h.pipeline
        .run(resolve("MonitorGemini", json!({ "sequence": [] })))
        .await;

    assert_eq!(h.notifier.sent()[0].output, json!({}));
}

#[tokio::test]
async fn hydrate_resolves_cids_against_search_output() {
    let h = harness(MockSearcher::new(), MockFilter::returning(json!({})), RecordingNotifier::new());

    let search_output = serde_json::to_value(vec![post("c1", "one"), post("c3", "three")]).unwrap();
    h.pipeline
        .run(resolve(
            "MonitorHydrate",
            json!({ "sequence": [
                { "name": "MonitorBluesky", "output": search_output },
                { "name": "MonitorGemini", "output": { "cids": ["c1", "c2"], "breaking": ["c3"], "keywords": ["k/v"] } }
            ] }),
        ))
        .await;

    let output = &h.notifier.sent()[0].output;
    assert!(output.get("cids").is_none());
    assert_eq!(output["posts"].as_array().unwrap().len(), 1);
    assert_eq!(output["posts"][0]["cid"], "c1");
    assert_eq!(output["breaking"][0]["cid"], "c3");
    assert_eq!(output["breaking"][0]["record"]["text"], "three");
    assert_eq!(output["keywords"], json!(["k/v"]));
}

#[tokio::test]
async fn deliver_reports_placeholder() {
    let h = harness(MockSearcher::new(), MockFilter::returning(json!({})), RecordingNotifier::new());

    let outcome = h
        .pipeline
        .run(job(StageRequest::Deliver(DeliverInput {
            hydrated: Some(json!({ "posts": [] })),
        })))
        .await;

    assert_eq!(outcome, StageOutcome::Reported);
    let sent = h.notifier.sent();
    assert_eq!(sent[0].stage, "MonitorSlack");
    assert_eq!(sent[0].output, json!({}));
}

#[tokio::test]
async fn tutti_matches_staged_path() {
    let searcher = || {
        MockSearcher::new()
            .on_term("quake", vec![post("c1", "Shaking felt"), post("c2", "Lunch pics")])
    };
    let verdict = json!({ "cids": ["c2"], "breaking": ["c1"], "keywords": ["disaster/quake"] });

    // Single-shot.
    let tutti = harness(searcher(), MockFilter::returning(verdict.clone()), RecordingNotifier::new());
    let outcome = tutti
        .pipeline
        .run(job(StageRequest::Tutti(SearchInput {
            keywords: vec!["quake".into()],
            window_secs: 60,
        })))
        .await;
    assert_eq!(outcome, StageOutcome::Reported);
    let sent = tutti.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].stage, "TuttiMonitor");

    // Staged, feeding each output into the next stage.
    let staged = harness(searcher(), MockFilter::returning(verdict), RecordingNotifier::new());
    staged
        .pipeline
        .run(job(StageRequest::Search(SearchInput {
            keywords: vec!["quake".into()],
            window_secs: 60,
        })))
        .await;
    let search_output = staged.notifier.sent()[0].output.clone();
    staged
        .pipeline
        .run(resolve("MonitorGemini", json!({ "sequence": [{ "name": "MonitorBluesky", "output": search_output }] })))
        .await;
    let filter_output = staged.notifier.sent()[1].output.clone();
    staged
        .pipeline
        .run(resolve(
            "MonitorHydrate",
            json!({ "sequence": [
                { "name": "MonitorBluesky", "output": search_output },
                { "name": "MonitorGemini", "output": filter_output }
            ] }),
        ))
        .await;

    assert_eq!(staged.notifier.sent()[2].output, sent[0].output);
}

#[tokio::test]
async fn notify_failure_is_swallowed_and_counted() {
    let h = harness(MockSearcher::new(), MockFilter::returning(json!({})), RecordingNotifier::failing());

    let outcome = h
        .pipeline
        .run(job(StageRequest::Hydrate(HydrateInput {
            filter: Default::default(),
            posts: vec![],
        })))
        .await;

    assert_eq!(outcome, StageOutcome::NotifyFailed);
    assert_eq!(h.notifier.sent().len(), 1);
    assert_eq!(h.stats.snapshot().stages["MonitorHydrate"].notify_failed, 1);
}
