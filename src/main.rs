// Copyright 2026 Auger Contributors
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code, unused_imports)]

use std::fs;
use std::io::Read;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use auger::request::resolve_request;
use auger::{Content, Engine, ExecutionContext};

#[derive(Parser)]
#[command(
    name = "auger",
    about = "Auger — selector-rule engine for HTML and JSON extraction",
    version,
    after_help = "Run 'auger <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a rule against a local document
    Run {
        /// Document to read (HTML or JSON), or '-' for stdin
        file: String,
        /// Rule to evaluate
        rule: String,
        /// Base URL the document notionally came from
        #[arg(long, default_value = "http://localhost/")]
        base_url: String,
        /// Force HTML content handling
        #[arg(long, conflicts_with = "as_json")]
        as_html: bool,
        /// Force JSON content handling
        #[arg(long)]
        as_json: bool,
        /// Result shape
        #[arg(long, value_enum, default_value_t = Shape::List)]
        shape: Shape,
        /// Page number bound into script contexts
        #[arg(long)]
        page: Option<i64>,
    },
    /// Resolve a request template into a request descriptor
    Request {
        /// Template, e.g. 'search.php?q=rust,{"method":"POST"}'
        template: String,
        /// Base URL to resolve against
        #[arg(long, default_value = "http://localhost/")]
        base_url: String,
        /// Page number for <1,2,3> placeholders
        #[arg(long)]
        page: Option<i64>,
    },
    /// Compile a rule and report its structure or the first syntax error
    Check {
        /// Rule to compile
        rule: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Shape {
    /// One result per line
    List,
    /// Results joined into one string
    String,
    /// Outer HTML / compact JSON fragments for nested rules
    Fragments,
    /// URL-resolved, deduplicated results
    Urls,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let directive = if cli.verbose {
        "auger=debug"
    } else {
        "auger=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(directive.parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            file,
            rule,
            base_url,
            as_html,
            as_json,
            shape,
            page,
        } => run_rule(cli.json, &file, &rule, &base_url, as_html, as_json, shape, page),
        Commands::Request {
            template,
            base_url,
            page,
        } => run_request(cli.json, &template, &base_url, page),
        Commands::Check { rule } => run_check(cli.json, &rule),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_rule(
    json_out: bool,
    file: &str,
    rule: &str,
    base_url: &str,
    as_html: bool,
    as_json: bool,
    shape: Shape,
    page: Option<i64>,
) -> Result<()> {
    let text = read_input(file)?;
    let content = if as_html {
        Content::from_html(text)
    } else if as_json {
        let value = serde_json::from_str(&text).context("input is not valid JSON")?;
        Content::from_json(value)
    } else {
        Content::detect(&text)
    };

    let engine = Engine::new();
    let mut ctx = ExecutionContext::new(base_url);
    if let Some(p) = page {
        ctx = ctx.with_page(p);
    }

    if let Shape::String = shape {
        let result = engine.extract_string(&mut ctx, &content, rule);
        if json_out {
            println!("{}", serde_json::json!({ "result": result }));
        } else {
            println!("{result}");
        }
        return Ok(());
    }

    let list = match shape {
        Shape::List => engine.extract_list(&mut ctx, &content, rule),
        Shape::Fragments => engine.extract_fragments(&mut ctx, &content, rule),
        Shape::Urls => engine.extract_urls(&mut ctx, &content, rule),
        Shape::String => unreachable!(),
    };
    if json_out {
        println!("{}", serde_json::to_string_pretty(&list)?);
    } else {
        for item in &list {
            println!("{item}");
        }
    }
    Ok(())
}

fn run_request(json_out: bool, template: &str, base_url: &str, page: Option<i64>) -> Result<()> {
    let engine = Engine::new();
    let mut ctx = ExecutionContext::new(base_url);
    if let Some(p) = page {
        ctx = ctx.with_page(p);
    }
    let desc = resolve_request(&engine, &ctx, template);
    if json_out {
        println!("{}", serde_json::to_string_pretty(&desc)?);
        return Ok(());
    }
    println!("{} {}", desc.method, desc.final_url);
    for (key, value) in &desc.headers {
        println!("{key}: {value}");
    }
    if let Some(form) = &desc.encoded_form {
        println!("form: {form}");
    }
    if let Some(body) = &desc.raw_body {
        println!("body: {body}");
    }
    if let Some(charset) = &desc.charset {
        println!("charset: {charset}");
    }
    if desc.use_browser_render {
        println!("render: browser, {}ms delay", desc.delay_ms);
    }
    Ok(())
}

fn run_check(json_out: bool, rule: &str) -> Result<()> {
    let engine = Engine::new();
    let compiled = engine.compile(rule)?;
    if json_out {
        let alternatives: Vec<serde_json::Value> = compiled
            .alternatives
            .iter()
            .flat_map(|alt| alt.as_ref().ok())
            .map(|expr| {
                serde_json::json!({
                    "mode": expr.mode,
                    "normalized": expr.reconstruct(),
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "combinator": compiled.combinator,
                "alternatives": alternatives,
            }))?
        );
        return Ok(());
    }
    println!("combinator: {:?}", compiled.combinator);
    for (i, alt) in compiled.alternatives.iter().enumerate() {
        if let Ok(expr) = alt {
            println!("  [{i}] {:?}  {}", expr.mode, expr.reconstruct());
        }
    }
    Ok(())
}

fn read_input(file: &str) -> Result<String> {
    if file == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading stdin")?;
        Ok(buf)
    } else {
        fs::read_to_string(file).with_context(|| format!("reading {file}"))
    }
}
