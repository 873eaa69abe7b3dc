use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use lore_core::ast::Parser;
use lore_core::context::{Context, MemorySource};
use lore_core::diag::Diagnostics;

const COMMAND: &str = "\
const int TRUE = 1;
int Abs(int value);
void Speak(string text, int volume);
";

const SHARED: &str = "\
// Upper bound for the running tally.
const int LIMIT = 40;

int Roll(int seed) {
    return (seed * 7 + 3) / 2;
}
";

const SCRIPT: &str = "\
#include \"shared\"

int tally = 0;

int clamp(int value, int low, int high) {
    if (value < low) {
        return low;
    }
    if (value > high) {
        return high;
    }
    return value;
}

void main() {
    int turn = 0;
    while (turn < 100) {
        turn = turn + 1;
        tally = clamp(tally + Roll(turn), 0, LIMIT);
        if (tally == LIMIT) {
            Speak(\"capped\", tally);
        }
    }
}
";

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .ok();
}

fn source() -> MemorySource {
    let mut source = MemorySource::new();
    source.insert("loreapi", COMMAND);
    source.insert("shared", SHARED);
    source.insert("main", SCRIPT);
    source
}

// Benchmark 1: lexing and parsing, no name resolution
fn bench_parse(c: &mut Criterion) {
    init_logging();
    c.bench_function("parse_script", |b| {
        b.iter(|| {
            let mut diags = Diagnostics::new();
            let ast = Parser::new("main", SCRIPT, &mut diags).parse();
            black_box((&ast, &diags));
        })
    });
}

// Benchmark 2: full pipeline on a cold context, includes and command script
fn bench_pipeline(c: &mut Criterion) {
    init_logging();
    c.bench_function("context_build", |b| {
        b.iter(|| {
            let ctx = Context::new(source());
            black_box(ctx.get("main"));
        })
    });
}

// Benchmark 3: completion latency against a warm cache
fn bench_completion(c: &mut Criterion) {
    init_logging();
    let ctx = Context::new(source());
    let script = ctx.get("main").expect("script builds");
    c.bench_function("complete_at", |b| {
        b.iter(|| {
            black_box(script.complete_at(&ctx, "t", 19, 9));
        })
    });
}

// Criterion benchmark group definition
criterion_group!(benches, bench_parse, bench_pipeline, bench_completion);
criterion_main!(benches);
