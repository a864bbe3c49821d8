use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use worldmap::{CountryRegistry, World, WorldConfig, WorldOptions, load_grid, preview};

/// Мир-сетка планеты: генерация, просмотр и изменение сохранений
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Путь к конфигурационному файлу в формате TOML
    #[arg(short, long, global = true, default_value = "world.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Генерирует новый мир и сохраняет его
    Generate {
        /// Имя сохранения в каталоге `saves_dir`
        #[arg(short, long)]
        save: String,
        /// Дополнительно записать высотную карту в PNG
        #[arg(long)]
        preview: Option<PathBuf>,
    },
    /// Печатает сводку сохранения в JSON
    Info {
        #[arg(short, long)]
        save: String,
    },
    /// Присваивает клетку (или заливкой область) стране и пересохраняет мир
    Claim {
        #[arg(short, long)]
        save: String,
        #[arg(short)]
        x: i64,
        #[arg(short)]
        y: i64,
        /// Идентификатор страны
        #[arg(long)]
        country: u32,
        /// Захватить всю связную ничью сушу от этой клетки
        #[arg(long)]
        fill: bool,
    },
    /// Экспортирует сохранение в PNG
    Export {
        #[arg(short, long)]
        save: String,
        #[arg(short, long, default_value = "world.png")]
        output: PathBuf,
        /// Раскрасить клетки цветами стран
        #[arg(long)]
        political: bool,
    },
}

/// Открывает сохранённый мир без генерации рельефа
fn open_saved(config: &WorldConfig, name: &str) -> Result<World, Box<dyn std::error::Error>> {
    let countries = CountryRegistry::from_file(&config.countries)?;
    let grid = load_grid(&config.saves_dir.join(name))?;
    Ok(World::new(grid, countries, WorldOptions::from(config))?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    println!("🔍 Загрузка конфигурации...");
    let config = WorldConfig::from_toml_file(&cli.config)?;

    match cli.command {
        Command::Generate {
            save,
            preview: preview_path,
        } => {
            println!(
                "Генерация мира (размер: {}×{})...",
                2 * config.resolution,
                config.resolution
            );
            let world = World::from_config(&config)?;
            fs::create_dir_all(&config.saves_dir)?;
            let path = world.save_world(&save)?;
            println!("Сохранение в {}", path.display());

            if let Some(output) = preview_path {
                preview::save_height_png(&world.snapshot(), &output)?;
                println!("Превью записано в {}", output.display());
            }
            println!("\nГотово!");
        }
        Command::Info { save } => {
            let world = open_saved(&config, &save)?;
            let grid = world.snapshot();

            let mut tiles_by_owner: BTreeMap<u32, usize> = BTreeMap::new();
            for tile in grid.tiles() {
                *tiles_by_owner.entry(tile.owner).or_default() += 1;
            }
            let countries: Vec<_> = world
                .countries()
                .into_iter()
                .map(|country| {
                    serde_json::json!({
                        "tiles": tiles_by_owner.get(&country.id).copied().unwrap_or(0),
                        "country": country,
                    })
                })
                .collect();

            let summary = serde_json::json!({
                "save": save,
                "resolution": grid.resolution(),
                "width": grid.width(),
                "height": grid.height(),
                "max_height": grid.max_height(),
                "min_height": grid.min_height(),
                "ocean_ratio": grid.ocean_ratio(),
                "countries": countries,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Claim {
            save,
            x,
            y,
            country,
            fill,
        } => {
            let world = open_saved(&config, &save)?;
            let claimed = if fill {
                let report = world.set_owner_fill((x, y), country)?.wait();
                println!("Заливка: {:?}, захвачено клеток: {}", report.outcome, report.claimed);
                report.claimed
            } else {
                usize::from(world.set_owner_at((x, y), country)?)
            };

            if claimed == 0 {
                println!("Ничего не изменилось");
                return Ok(());
            }
            world.recompute_name_points();
            let path = world.save_world(&save)?;
            println!("Сохранение обновлено: {}", path.display());
        }
        Command::Export {
            save,
            output,
            political,
        } => {
            let world = open_saved(&config, &save)?;
            let grid = world.snapshot();
            if political {
                preview::save_political_png(&grid, &world.palette(), &output)?;
            } else {
                preview::save_height_png(&grid, &output)?;
            }
            println!("Изображение записано в {}", output.display());
        }
    }

    Ok(())
}
