use std::path::Path;

use clap::Parser;
use colored::Colorize;

use quillclib::{
    compile::Compiler,
    diagnostics::{Diagnostic, Severity},
    frontend::{FsLoader, JsonFrontend},
};
use quill_syntax::ast::Ast;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
struct Args {
    /// Parse tree of the entry module, as written by the quill parser.
    file: String,

    /// Dump the source tree after all passes instead of the output.
    #[arg(long)]
    print_ast: bool,

    /// Pretty-print the lowered output JSON.
    #[arg(long)]
    pretty: bool,

    /// Log filter, overridden by RUST_LOG when set.
    #[arg(long, default_value = "warn")]
    log: String,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log)),
        )
        .init();
    let mut compiler = Compiler::new(FsLoader, JsonFrontend);
    let output = compiler.compile_entry(Path::new(&args.file))?;

    for diagnostic in output.diagnostics.iter() {
        report(diagnostic, &compiler.ast);
    }

    if args.print_ast {
        println!("{}", compiler.ast.pretty(output.module));
        return Ok(());
    }

    let rendered = if args.pretty {
        serde_json::to_string_pretty(&output.fragment)?
    } else {
        serde_json::to_string(&output.fragment)?
    };
    println!("{rendered}");

    if output.diagnostics.has_errors() {
        std::process::exit(1);
    }
    Ok(())
}

fn report(diagnostic: &Diagnostic, ast: &Ast) {
    let tag = match diagnostic.severity {
        Severity::Error => "error".red().bold(),
        Severity::Warning => "warning".yellow().bold(),
    };
    let location = diagnostic
        .node
        .and_then(|node| ast.span_of(node))
        .map(|span| format!(" [{}..{}]", span.start, span.end))
        .unwrap_or_default();
    eprintln!("{tag}: {}{}", diagnostic.message, location.dimmed());
}
