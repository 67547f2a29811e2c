//! Timetable command handlers.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use timegen_core::render;

use crate::cli::Client;

pub async fn generate(client: &Client, prompt: &str, html_out: Option<&Path>) -> Result<()> {
    let result = client.timetables.generate_with_ai(prompt).await?;
    let timetable = result.timetable();

    match &timetable {
        Some(tt) => print!("{}", render::render_timetable(tt)),
        None => println!(
            "{}",
            serde_json::to_string_pretty(&result.data).context("format generation result")?
        ),
    }

    if let Some(path) = html_out {
        let html = result
            .html
            .as_deref()
            .filter(|h| !h.is_empty())
            .or_else(|| {
                timetable
                    .as_ref()
                    .map(|tt| tt.html_content.as_str())
                    .filter(|h| !h.is_empty())
            });
        match html {
            Some(html) => {
                write_file(path, html)?;
                eprintln!("Wrote HTML to {}", path.display());
            }
            None => eprintln!("Warning: the server returned no HTML; nothing written"),
        }
    }
    Ok(())
}

pub async fn list(client: &Client) -> Result<()> {
    let timetables = client.timetables.list_generated().await?;
    println!("{}", render::render_timetable_list(&timetables));
    Ok(())
}

pub async fn show(client: &Client, id: &str) -> Result<()> {
    let timetable = client.timetables.get_generated(id).await?;
    print!("{}", render::render_timetable(&timetable));
    Ok(())
}

pub async fn export(client: &Client, id: &str, out: Option<&Path>) -> Result<()> {
    let html = client.timetables.export_html(id).await?;

    if out == Some(Path::new("-")) {
        print!("{html}");
        return Ok(());
    }

    let path = match out {
        Some(path) => path.to_path_buf(),
        None => {
            let timetable = client.timetables.get_generated(id).await?;
            PathBuf::from(render::export_filename(&timetable))
        }
    };
    write_file(&path, &html)?;
    println!("Exported to {}", path.display());
    Ok(())
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}
