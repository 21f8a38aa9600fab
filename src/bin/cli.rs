use clap::Parser;
use hydronet::store::FeatureStore;
use hydronet::{ConsolidationParams, run_pipeline, save_preview_png};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Консолидация берегов, озёр и рек нарисованной карты
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Путь к конфигурационному файлу в формате TOML
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Префикс таблицы (перекрывает `table` из конфигурации)
    #[arg(short, long)]
    table: Option<String>,

    /// Подробный журнал
    #[arg(short, long)]
    verbose: bool,

    /// Сохранить превью сети в PNG
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Ширина превью в пикселях
    #[arg(long, default_value_t = 2048)]
    preview_width: u32,

    /// Сохранить отчёт в JSON
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    println!("🔍 Загрузка конфигурации...");
    let mut params = match &cli.config {
        Some(path) => ConsolidationParams::from_toml_file(path)?,
        None => ConsolidationParams::default(),
    };
    if let Some(table) = cli.table {
        params.table = table;
    }
    params.verbose |= cli.verbose;
    params.validate()?;

    let default_level = if params.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let path = FeatureStore::table_path(&params.table);
    println!("Загрузка таблицы {}", path.display());
    let mut store = FeatureStore::load(&path)?;
    println!("Сегментов: {}", store.len());

    let (report, _) = run_pipeline(&mut store, &params)?;
    store.save(&path)?;

    println!("\n📋 Итог:");
    println!(
        "  берега: сшито {}, замкнуто {}, открытых {}",
        report.bridges_merged,
        report.self_closed,
        report.unresolved_coasts.len()
    );
    println!(
        "  острова: найдено {:?}, не найдено {:?}",
        report.islands_found, report.islands_missing
    );
    println!(
        "  озёра: именованных {}, безымянных {}",
        report.lakes_named, report.lakes_generic
    );
    println!(
        "  реки: устьев {}, уровней {}, без устья {}",
        report.mouths,
        report.level_count(),
        report.unresolved_streams.len()
    );

    if let Some(out) = &cli.report {
        std::fs::write(out, serde_json::to_string_pretty(&report)?)?;
        println!("Отчёт сохранён в {}", out.display());
    }

    if let Some(out) = &cli.preview {
        let out = out.to_str().ok_or("preview path is not valid UTF-8")?;
        save_preview_png(&store, cli.preview_width, out)?;
        println!("Превью сохранено в {out}");
    }

    println!("\nГотово! Таблица {} обновлена.", path.display());
    Ok(())
}
