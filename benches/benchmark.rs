use criterion::{black_box, criterion_group, criterion_main, Criterion};
use docshot::{
    substitute, CaptureRequest, ColorScheme, Config, Directive, Document, Fingerprint,
    OutputFormat, SourceKind, StatusPolicy, Viewport,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

// Fast settings for all benchmarks
fn configure_fast_group(group: &mut criterion::BenchmarkGroup<criterion::measurement::WallTime>) {
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_millis(500));
    group.sample_size(20);
}

fn sample_request() -> CaptureRequest {
    let mut headers = BTreeMap::new();
    headers.insert("Authorization".to_string(), "Bearer token".to_string());
    CaptureRequest {
        url: "http://localhost:4000/settings".to_string(),
        raw_target: "|app|/settings".to_string(),
        browser: "chromium".to_string(),
        viewport: Viewport {
            width: 1280,
            height: 960,
        },
        device_scale_factor: 2,
        color_scheme: ColorScheme::Dark,
        locale: Some("en-US".to_string()),
        timezone: Some("Europe/Berlin".to_string()),
        headers,
        interactions: "document.querySelector('#advanced').click();".to_string(),
        context: String::new(),
        full_page: true,
        pdf: false,
        status_codes: None,
        status_policy: StatusPolicy::default(),
        format: OutputFormat::Png,
    }
}

fn benchmark_config_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("config");
    configure_fast_group(&mut group);

    group.bench_function("creation", |b| {
        b.iter(|| black_box(Config::default()));
    });

    group.finish();
}

fn benchmark_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");
    configure_fast_group(&mut group);

    let request = sample_request();
    group.bench_function("sha256", |b| {
        b.iter(|| black_box(Fingerprint::of(black_box(&request))));
    });

    group.finish();
}

fn benchmark_directive_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("directive");
    configure_fast_group(&mut group);

    let body = [
        ":viewport-width: 1024",
        ":color-scheme: auto",
        ":headers:",
        "   Authorization Bearer token",
        "   X-Trace 1",
        ":interactions:",
        "   document.querySelector('#advanced').click();",
        "",
        "The settings page.",
    ];
    group.bench_function("parse", |b| {
        b.iter(|| {
            let directive = Directive::parse(Path::new("index.rst"), 3, "|app|/settings", &body);
            let _ = black_box(directive);
        });
    });

    group.finish();
}

fn benchmark_document_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("document");
    configure_fast_group(&mut group);

    let mut rst = String::new();
    for i in 0..50 {
        rst.push_str(&format!(
            "Section {i}\n==========\n\nSome prose.\n\n.. screenshot:: |app|/page/{i}\n   :full-page:\n\n   Page {i}.\n\n"
        ));
    }
    group.bench_function("rst_50_directives", |b| {
        b.iter(|| {
            let document = Document::parse(Path::new("index.rst"), SourceKind::Rst, &rst);
            let _ = black_box(document);
        });
    });

    let mut md = String::new();
    for i in 0..50 {
        md.push_str(&format!(
            "## Section {i}\n\n```{{screenshot}} |app|/page/{i}\n:full-page:\n```\n\n```python\nprint({i})\n```\n\n"
        ));
    }
    group.bench_function("markdown_50_directives", |b| {
        b.iter(|| {
            let document = Document::parse(Path::new("index.md"), SourceKind::Markdown, &md);
            let _ = black_box(document);
        });
    });

    group.finish();
}

fn benchmark_substitution(c: &mut Criterion) {
    let mut group = c.benchmark_group("substitution");
    configure_fast_group(&mut group);

    let mut substitutions = BTreeMap::new();
    substitutions.insert("app".to_string(), "http://localhost:4000".to_string());
    substitutions.insert("version".to_string(), "1.2.3".to_string());

    group.bench_function("substitute", |b| {
        b.iter(|| {
            black_box(substitute(
                black_box("|app|/release/|version|/notes?a|b"),
                &substitutions,
            ))
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_config_creation,
    benchmark_fingerprint,
    benchmark_directive_parsing,
    benchmark_document_parsing,
    benchmark_substitution
);
criterion_main!(benches);
