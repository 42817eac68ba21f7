use criterion::{black_box, criterion_group, criterion_main, Criterion};
use indoc::indoc;
use srpatch::{
    apply_diff_to_content, parse_diff_block, similarity, ApplyOptions, LineRange, RegionLocator,
};

/// A file of `count` small functions, one of which is the patch target.
fn generate_source(count: usize) -> String {
    (0..count)
        .map(|i| {
            format!(
                "fn function_{i}(value: u32) -> u32 {{\n    let scaled = value * {i};\n    scaled + 1\n}}\n\n",
                i = i
            )
        })
        .collect()
}

// --- Scoring Benchmarks ---

fn scoring_benches(c: &mut Criterion) {
    let mut group = c.benchmark_group("Scoring");

    let line_a = "    let scaled = value * 250; // multiply by the configured factor";
    let line_b = "    let scaled = value * 205; // multiply by the configured factor!";
    group.bench_function("similarity_single_line", |b| {
        b.iter(|| similarity(black_box(line_a), black_box(line_b)))
    });

    let block_a = generate_source(5);
    let block_b = block_a.replace("scaled + 1", "scaled + 2");
    group.bench_function("similarity_five_functions", |b| {
        b.iter(|| similarity(black_box(&block_a), black_box(&block_b)))
    });

    group.finish();
}

// --- Parsing Benchmarks ---

fn parsing_benches(c: &mut Criterion) {
    let mut group = c.benchmark_group("Parsing");

    let plain = indoc! {"
        <<<<<<< SEARCH
            let scaled = value * 250;
            scaled + 1
        =======
            let scaled = value * 250;
            scaled + 2
        >>>>>>> REPLACE
    "};
    group.bench_function("plain_block", |b| {
        b.iter(|| parse_diff_block(black_box(plain)).unwrap())
    });

    let numbered = indoc! {"
        <<<<<<< SEARCH
        1002 |     let scaled = value * 250;
        1003 |     scaled + 1
        =======
        1002 |     let scaled = value * 250;
        1003 |     scaled + 2
        >>>>>>> REPLACE
    "};
    group.bench_function("numbered_block", |b| {
        b.iter(|| parse_diff_block(black_box(numbered)).unwrap())
    });

    group.finish();
}

// --- Locating and Applying Benchmarks ---

fn applying_benches(c: &mut Criterion) {
    let mut group = c.benchmark_group("Applying");

    // 500 functions of 5 lines each; function 250 starts on line 1251.
    let source = generate_source(500);
    let lines: Vec<&str> = source.split('\n').collect();
    let search = ["    let scaled = value * 250;", "    scaled + 1"];
    let locator = RegionLocator::new(0.9, 20);

    group.bench_function("locate_exact_hint", |b| {
        b.iter(|| {
            locator
                .locate(black_box(&lines), &search, Some(LineRange::new(1252, 1253)))
                .unwrap()
        })
    });

    group.bench_function("locate_stale_hint", |b| {
        b.iter(|| {
            locator
                .locate(black_box(&lines), &search, Some(LineRange::new(1240, 1241)))
                .unwrap()
        })
    });

    let small = generate_source(40);
    let small_lines: Vec<&str> = small.split('\n').collect();
    let small_search = ["    let scaled = value * 20;", "    scaled + 1"];
    group.bench_function("locate_whole_file_without_hint", |b| {
        b.iter(|| {
            locator
                .locate(black_box(&small_lines), &small_search, None)
                .unwrap()
        })
    });

    let diff = indoc! {"
        <<<<<<< SEARCH
            let scaled = value * 250;
            scaled + 1
        =======
            let scaled = value * 250;
            scaled + 2
        >>>>>>> REPLACE
    "};
    let options = ApplyOptions::default();
    group.bench_function("apply_diff_to_content_stale_hint", |b| {
        b.iter(|| {
            apply_diff_to_content(
                black_box(&source),
                black_box(diff),
                Some(LineRange::new(1245, 1246)),
                &options,
            )
            .unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, scoring_benches, parsing_benches, applying_benches);
criterion_main!(benches);
