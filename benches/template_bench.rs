//! Quick benchmark for parse, render and flush costs

use scopebind::{template, Env, Store};
use serde_json::json;
use std::time::Instant;

fn main() {
    let templates = vec![
        "Simple text with no templates",
        "Hello {{user.name}}",
        "{{#with post as p}}<h1>{{p.title}}</h1>{{/with}}",
        "{{#with post as p}}{{#with user as u}}{{u.name}}: {{p.title}}{{/with}}{{/with}}",
        "{{#with items as list}}{{#if list}}{{list}}{{else}}empty{{/if}}{{else}}none{{/with}}",
    ];

    println!("Template Parse Performance Test");
    println!("===============================\n");

    for template in &templates {
        let iterations = 100_000;
        let start = Instant::now();

        for _ in 0..iterations {
            let _ = template::parse(template);
        }

        let elapsed = start.elapsed();
        println!("Template: {:60}", format!("\"{}\"", template));
        println!("  Time for {} iterations: {:?}", iterations, elapsed);
        println!("  Per operation: {:?}\n", elapsed / iterations);
    }

    println!("Render + Teardown Performance");
    println!("=============================\n");

    let env = Env::default();
    let store = Store::new(json!({
        "user": {"name": "Ada"},
        "post": {"title": "Hi"},
        "items": [1, 2, 3],
    }));

    for template in &templates {
        let iterations = 20_000;
        let start = Instant::now();

        for _ in 0..iterations {
            let rendered = env.render_str(template, &store).expect("render");
            let _ = rendered.html();
        }

        let elapsed = start.elapsed();
        println!("Template: {:60}", format!("\"{}\"", template));
        println!("  Per render: {:?}\n", elapsed / iterations);
    }

    println!("Update + Flush Performance");
    println!("==========================\n");

    let rendered = env
        .render_str("{{#with post as p}}<h1>{{p.title}}</h1>{{/with}} {{user.name}}", &store)
        .expect("render");
    let iterations: u32 = 100_000;
    let start = Instant::now();

    for i in 0..iterations {
        store.set("post.title", json!(i)).expect("set");
        rendered.flush().expect("flush");
    }

    let elapsed = start.elapsed();
    println!("  Time for {} updates: {:?}", iterations, elapsed);
    println!("  Per update: {:?}", elapsed / iterations);
    println!("  Live watchers: {}", store.watcher_count());
}
