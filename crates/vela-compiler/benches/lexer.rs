use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use vela_compiler::{compile, CompileOptions, Lexer};

fn bench_keywords(c: &mut Criterion) {
    let source = "function local if else elseif for while repeat until return end switch case continue class enum export";

    c.bench_function("lex_keywords", |b| {
        b.iter(|| {
            let lexer = Lexer::new(black_box(source));
            lexer.tokenize().unwrap()
        });
    });
}

fn bench_numbers(c: &mut Criterion) {
    let mut group = c.benchmark_group("numbers");

    let integers = "42 123 0 999 1000000";
    group.bench_with_input(
        BenchmarkId::new("integers", "simple"),
        &integers,
        |b, source| {
            b.iter(|| {
                let lexer = Lexer::new(black_box(source));
                lexer.tokenize().unwrap()
            });
        },
    );

    let hex = "0xFF 0x1234 0xDEADBEEF";
    group.bench_with_input(BenchmarkId::new("hex", "various"), &hex, |b, source| {
        b.iter(|| {
            let lexer = Lexer::new(black_box(source));
            lexer.tokenize().unwrap()
        });
    });

    let floats = "3.14 2.718 1.414 0.5 123.456e10 1.23e-5";
    group.bench_with_input(BenchmarkId::new("floats", "various"), &floats, |b, source| {
        b.iter(|| {
            let lexer = Lexer::new(black_box(source));
            lexer.tokenize().unwrap()
        });
    });

    group.finish();
}

fn bench_strings(c: &mut Criterion) {
    let mut group = c.benchmark_group("strings");

    let simple = r#""hello" "world" 'single'"#;
    group.bench_with_input(
        BenchmarkId::new("simple", "3 strings"),
        &simple,
        |b, source| {
            b.iter(|| {
                let lexer = Lexer::new(black_box(source));
                lexer.tokenize().unwrap()
            });
        },
    );

    let escapes = r#""line1\nline2" "tab\there" "quote\"test""#;
    group.bench_with_input(
        BenchmarkId::new("escapes", "basic"),
        &escapes,
        |b, source| {
            b.iter(|| {
                let lexer = Lexer::new(black_box(source));
                lexer.tokenize().unwrap()
            });
        },
    );

    let long = "[[a long\nbracket string\nspanning lines]] [==[with levels]==]";
    group.bench_with_input(
        BenchmarkId::new("long_brackets", "various"),
        &long,
        |b, source| {
            b.iter(|| {
                let lexer = Lexer::new(black_box(source));
                lexer.tokenize().unwrap()
            });
        },
    );

    group.finish();
}

fn bench_real_code(c: &mut Criterion) {
    let mut group = c.benchmark_group("real_code");

    let function_def = r#"
        local function fetch_user(id: int): table
            local response = http.get("/api/users/" .. id)
            if not response.ok then
                error("failed to fetch user")
            end
            return response.body
        end
    "#;

    group.throughput(Throughput::Bytes(function_def.len() as u64));
    group.bench_with_input(
        BenchmarkId::new("function", "with_hints"),
        &function_def,
        |b, source| {
            b.iter(|| {
                let lexer = Lexer::new(black_box(source));
                lexer.tokenize().unwrap()
            });
        },
    );

    let class_def = r#"
        local class Calculator do
            private result = 0

            function add(x)
                self.result += x
                return self
            end

            function get_result()
                return self.result
            end
        end
    "#;

    group.throughput(Throughput::Bytes(class_def.len() as u64));
    group.bench_with_input(
        BenchmarkId::new("class", "with_methods"),
        &class_def,
        |b, source| {
            b.iter(|| {
                let lexer = Lexer::new(black_box(source));
                lexer.tokenize().unwrap()
            });
        },
    );

    group.finish();
}

fn bench_full_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");

    // A realistic chunk mixing flow constructs
    let mut source = String::new();
    for i in 0..50 {
        source.push_str(&format!(
            r#"
local function process{i}(data, limit)
    local total = 0
    for k, v in data do
        switch v do
        case 0:
            continue
        default:
            total += v
        end
        if total > limit then break end
    end
    return total
end
"#
        ));
    }

    group.throughput(Throughput::Bytes(source.len() as u64));
    group.bench_with_input(
        BenchmarkId::new("50_functions", format!("{} bytes", source.len())),
        &source,
        |b, source| {
            let options = CompileOptions::default();
            b.iter(|| compile(black_box(source), "bench.vela", &options).unwrap());
        },
    );

    group.finish();
}

criterion_group!(
    benches,
    bench_keywords,
    bench_numbers,
    bench_strings,
    bench_real_code,
    bench_full_compile
);

criterion_main!(benches);
