use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mipsasm::asm::lexer;
use mipsasm::asm::preprocess::Preprocessor;
use mipsasm::diag::AssemblerLog;
use mipsasm::isa::InstructionSet;

fn criterion_benchmark(c: &mut Criterion) {
    {
        let isa = InstructionSet::standard().unwrap();
        let source = include_str!("../tests/fibonacci.asm");

        c.bench_function("tokenize fibonacci", |b| {
            b.iter(|| {
                let mut preprocessor = Preprocessor::new();
                let mut log = AssemblerLog::new();
                black_box(lexer::tokenize(
                    "fibonacci.asm",
                    black_box(source),
                    &mut preprocessor,
                    &isa,
                    &mut log,
                ))
            })
        });

        c.bench_function("assemble fibonacci", |b| {
            b.iter(|| black_box(mipsasm::assemble("fibonacci.asm", source)))
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
