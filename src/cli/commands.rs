use std::io::{self, BufRead, Write};

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::app::{AppContext, AppEvent, CoursewareError, Result};
use crate::domain::{CourseStructure, DownloadedState};
use crate::store::Store;

pub async fn login(ctx: &AppContext, username: &str, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => read_password()?,
    };

    let user = ctx.auth.login(username, &password).await?;
    println!("Signed in as {} <{}>", user.display_name(), user.email);
    Ok(())
}

fn read_password() -> Result<String> {
    print!("Password: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

pub async fn logout(ctx: &AppContext) -> Result<()> {
    ctx.auth.logout().await?;
    println!("Signed out");
    Ok(())
}

pub fn whoami(ctx: &AppContext) -> Result<()> {
    match ctx.auth.current_user() {
        Some(user) => println!("{} ({}) <{}>", user.display_name(), user.username, user.email),
        None => println!("Not signed in"),
    }
    Ok(())
}

pub async fn list_courses(ctx: &AppContext) -> Result<()> {
    let courses = ctx.courses.get_enrolled_courses().await?;

    if courses.is_empty() {
        println!("No courses");
        return Ok(());
    }

    for course in courses {
        let marker = if course.is_active { " " } else { "x" };
        let dates = match (course.start, course.end) {
            (Some(start), Some(end)) => format!(
                "{} - {}",
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d")
            ),
            (Some(start), None) => format!("from {}", start.format("%Y-%m-%d")),
            _ => String::new(),
        };
        println!("{} {}  {}\n  {}", marker, course.name, dates, course.course_id);
    }

    Ok(())
}

pub async fn show_structure(ctx: &AppContext, course_id: &str, refresh: bool) -> Result<()> {
    let structure = ctx.courses.get_course_structure(course_id, refresh).await?;
    print_structure(&structure);
    Ok(())
}

fn print_structure(structure: &CourseStructure) {
    println!("{} ({})", structure.name, structure.id);

    for (depth, block) in structure.walk().into_iter().skip(1) {
        let marker = if block.is_completed() { "✓" } else { " " };
        let kind = if block.block_type.is_container() {
            block.descendants_type.as_str()
        } else {
            block.block_type.as_str()
        };
        println!(
            "{}{} {} [{}]  {}",
            "  ".repeat(depth),
            marker,
            block.display_title(),
            kind,
            block.block_id
        );
    }
}

pub async fn resume(ctx: &AppContext, course_id: &str) -> Result<()> {
    let status = ctx.courses.get_course_status(course_id).await?;
    if status.last_visited_block_id.is_empty() {
        println!("Nothing visited yet");
        return Ok(());
    }

    let title = ctx
        .courses
        .get_course_structure(course_id, false)
        .await
        .ok()
        .and_then(|s| {
            s.block(&status.last_visited_block_id)
                .map(|b| b.display_title().to_string())
        });

    match title {
        Some(title) => println!("{}\n  {}", title, status.last_visited_block_id),
        None => println!("{}", status.last_visited_block_id),
    }
    Ok(())
}

pub async fn complete(ctx: &AppContext, course_id: &str, blocks: &[String]) -> Result<()> {
    ctx.courses.mark_blocks_completion(course_id, blocks).await?;
    println!("Marked {} block(s) complete", blocks.len());
    Ok(())
}

pub async fn open_block(ctx: &AppContext, course_id: &str, block_id: &str) -> Result<()> {
    let structure = ctx.courses.get_course_structure(course_id, false).await?;
    let block = structure
        .block(block_id)
        .ok_or_else(|| CoursewareError::BlockNotFound(block_id.to_string()))?;

    let url = if block.lms_web_url.is_empty() {
        &block.student_view_url
    } else {
        &block.lms_web_url
    };
    if url.is_empty() {
        println!("{} has no web page", block.display_title());
        return Ok(());
    }

    open::that(url)?;
    println!("Opened {}", url);
    Ok(())
}

pub async fn download_add(ctx: &AppContext, course_id: &str, blocks: &[String]) -> Result<()> {
    let structure = ctx.courses.get_course_structure(course_id, false).await?;
    let added = ctx.downloads.add_blocks(&structure, blocks)?;

    if added.is_empty() {
        println!("Nothing new to download");
        return Ok(());
    }
    for model in &added {
        println!("  + {} ({})", model.title, format_size(model.size));
    }
    println!("Queued {} download(s)", added.len());
    Ok(())
}

pub fn download_list(ctx: &AppContext) -> Result<()> {
    let downloads = ctx.downloads.list()?;

    if downloads.is_empty() {
        println!("No downloads");
        return Ok(());
    }

    for model in downloads {
        println!(
            "{:<14} {} ({})\n  {}",
            model.state.as_str(),
            model.title,
            format_size(model.size),
            model.id
        );
    }
    Ok(())
}

pub fn download_remove(ctx: &AppContext, id: &str) -> Result<()> {
    let model = ctx.downloads.remove(id)?;
    println!("Removed {}", model.title);
    Ok(())
}

pub async fn download_run(ctx: &AppContext) -> Result<()> {
    let waiting = ctx
        .store
        .get_downloads_by_state(DownloadedState::Waiting)?
        .len();
    if waiting == 0 {
        println!("Nothing to download");
        return Ok(());
    }
    println!("Downloading {} file(s)...", waiting);

    let mut events = ctx.notifier.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(AppEvent::DownloadProgress { id, value, size }) => {
                    if size > 0 {
                        println!("  {} {}%", id, value * 100 / size);
                    } else {
                        println!("  {} {}", id, format_size(value));
                    }
                }
                Ok(AppEvent::DownloadFinished { id }) => println!("  done {}", id),
                Ok(AppEvent::DownloadFailed(models)) => {
                    for model in models {
                        eprintln!("  failed {} ({})", model.title, model.url);
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    });

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        // Keep the handler installed so repeated presses are not lost.
        while tokio::signal::ctrl_c().await.is_ok() {
            if !on_ctrl_c.is_cancelled() {
                eprintln!("Canceling, remaining downloads stay queued");
            }
            on_ctrl_c.cancel();
        }
    });

    let result = ctx.worker.run(&cancel).await;
    ctrl_c.abort();
    // Let the printer catch up with the last events.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    printer.abort();

    let finished = result?;
    println!("Download complete: {} finished", finished);
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    match bytes {
        0 => "unknown size".to_string(),
        b if b >= GB => format!("{:.1} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.1} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.1} KB", b as f64 / KB as f64),
        b => format!("{} B", b),
    }
}
