//! Benchmarks for scheduling, templating and condition evaluation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use recipeflow::config::ConditionSemantics;
use recipeflow::expr::eval_condition;
use recipeflow::graph::build_graph;
use recipeflow::memory::RowMemory;
use recipeflow::recipe::{Recipe, Step};
use recipeflow::template::render;
use recipeflow::value::Value;
use serde_json::json;

fn chain_recipe(len: usize) -> Recipe {
    let mut recipe = Recipe::new().with_step(
        "s0",
        Step::new("echo", "").with_input(Value::from(json!({"v": "${variable.v}"}))),
    );
    for i in 1..len {
        let input = json!({"v": format!("${{s{}.output.v}}", i - 1), "w": "${variable.w}"});
        recipe = recipe.with_step(format!("s{i}"), Step::new("echo", "").with_input(Value::from(input)));
    }
    recipe
}

fn scheduler_benchmark(c: &mut Criterion) {
    let recipe = chain_recipe(100);

    c.bench_function("build_and_sort_chain_100", |b| {
        b.iter(|| {
            let graph = build_graph(black_box(&recipe.steps));
            black_box(graph.sort())
        });
    });
}

fn template_benchmark(c: &mut Criterion) {
    let row = RowMemory::new(
        Value::from(json!({"name": "world", "items": [1, 2, 3]})),
        Value::empty_map(),
    );
    let template = Value::from(json!({
        "greeting": "hello ${variable.name}",
        "items": "${variable.items}",
        "nested": {"second": "${variable.items[1]}"}
    }));

    c.bench_function("render_map_template", |b| {
        b.iter(|| black_box(render(black_box(&template), &row, false)));
    });
}

fn condition_benchmark(c: &mut Criterion) {
    let memory = Value::from(json!({
        "variable": {"n": 5, "name": "x"},
        "upper": {"output": {"text": "HI"}}
    }));
    let condition = "${variable.n} > 2 && ${upper.output.text} == \"HI\"";

    c.bench_function("eval_condition_strict", |b| {
        b.iter(|| {
            black_box(eval_condition(
                black_box(condition),
                &memory,
                ConditionSemantics::Strict,
            ))
        });
    });
}

criterion_group!(benches, scheduler_benchmark, template_benchmark, condition_benchmark);
criterion_main!(benches);
