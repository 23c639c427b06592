use colored::*;
use std::io::Write;

use crate::tools::{ToolDescriptor, ToolResult};

pub fn print_header(text: &str) {
    println!("\n{}", text.bright_cyan().bold());
    println!("{}", "=".repeat(text.chars().count()).bright_cyan());
}

pub fn print_success(text: &str) {
    println!("{}", text.green());
}

pub fn print_error(text: &str) {
    eprintln!("{}", text.red().bold());
}

pub fn print_info(text: &str) {
    println!("{}", text.blue());
}

pub fn print_prompt(text: &str) {
    print!("{}", text.yellow().bold());
    let _ = std::io::stdout().flush();
}

pub fn print_tools(tools: &[ToolDescriptor]) {
    for tool in tools {
        println!("{}  {}", tool.name.bright_green().bold(), tool.description);
        for param in &tool.parameters {
            let flag = if param.required {
                "required".yellow()
            } else {
                "optional".dimmed()
            };
            let default = param
                .default
                .as_ref()
                .map(|d| format!(" = {}", d))
                .unwrap_or_default();
            println!("    {} ({}, {}){}", param.name, param.param_type, flag, default);
        }
    }
}

pub fn print_tool_result(result: &ToolResult) {
    match result {
        ToolResult::Success(_) => {
            print_success("ok");
            println!("{}", result.to_model_text());
        }
        ToolResult::Failure(error) => {
            print_error(&format!("{}: {}", error.kind(), error));
        }
    }
}
