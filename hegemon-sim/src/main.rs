//! Headless host for the simulation core: scenario loading, the runtime
//! control surface (scripted or interactive verbs), save slots, and a
//! determinism verification mode.

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use hegemon_core::command::Command;
use hegemon_core::fixed::Fixed;
use hegemon_core::ids::{CountryId, ProvinceId, UnitId};
use hegemon_core::modifiers::TimedModifier;
use hegemon_core::save::{self, SaveMetadata};
use hegemon_core::scenario::ScenarioBlob;
use hegemon_core::{build_state, SimConfig, Simulation};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Instant;

mod loader;

#[derive(Parser, Debug)]
#[command(name = "hegemon-sim", about = "Deterministic grand-strategy simulation host")]
struct Args {
    /// Scenario blob (JSON). Omit to use the built-in mock scenario.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// RNG seed for the mock scenario.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Simulate this many in-game days, then exit.
    #[arg(short = 't', long, default_value_t = 0)]
    days: u64,

    /// Execute control verbs from a file (one per line, `#` comments).
    #[arg(long)]
    script: Option<PathBuf>,

    /// Read control verbs interactively from stdin.
    #[arg(long)]
    interactive: bool,

    /// Directory for quicksave/autosave/named saves.
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Load this save before doing anything else.
    #[arg(long)]
    load: Option<PathBuf>,

    /// Verification mode: run the scenario twice and require identical
    /// checksums. Exits non-zero on a determinism break.
    #[arg(long)]
    verify: bool,

    /// Hard-fail loads on a state checksum mismatch instead of warning.
    #[arg(long)]
    strict: bool,

    /// Autosave every N in-game days (0 = off).
    #[arg(long, default_value_t = 0)]
    autosave_days: u64,

    /// Write saves without deflate compression.
    #[arg(long)]
    uncompressed: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("error: {error:#}");
            std::process::exit(1);
        }
    }
}

fn run(args: Args) -> Result<i32> {
    let blob = match &args.scenario {
        Some(path) => loader::load_scenario(path)?,
        None => loader::mock_scenario(args.seed),
    };

    if args.verify {
        let days = if args.days == 0 { 30 } else { args.days };
        return verify_determinism(&blob, days);
    }

    let mut sim = new_simulation(&blob)?;
    let _handlers = sim.install_default_handlers();
    if args.strict {
        sim.config.strict_verification = true;
    }

    if let Some(path) = &args.load {
        let (metadata, log) =
            save::load_from_file(path, &mut sim.state, sim.config.strict_verification)
                .with_context(|| format!("loading {}", path.display()))?;
        sim.finalize_load();
        log::info!(
            "loaded '{}' at tick {} ({} logged commands)",
            metadata.save_name,
            metadata.tick,
            log.len()
        );
    }

    let save_dir = args
        .save_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("saves"));

    let mut console = Console {
        sim,
        save_dir,
        compress: !args.uncompressed,
        quit: false,
    };

    if let Some(path) = &args.script {
        let script = std::fs::read_to_string(path)
            .with_context(|| format!("reading script {}", path.display()))?;
        for line in script.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let output = console.execute(line)?;
            println!("{line}: {output}");
            if console.quit {
                break;
            }
        }
    }

    if args.interactive {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        while !console.quit {
            write!(stdout, "> ")?;
            stdout.flush()?;
            let mut line = String::new();
            if stdin.lock().read_line(&mut line)? == 0 {
                break;
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match console.execute(line) {
                Ok(output) => println!("{output}"),
                Err(error) => println!("error: {error:#}"),
            }
        }
    }

    if args.days > 0 {
        run_headless(&mut console, args.days, args.autosave_days)?;
    }

    print_summary(&console.sim);
    Ok(0)
}

fn new_simulation(blob: &ScenarioBlob) -> Result<Simulation> {
    let state = build_state(blob).map_err(|e| anyhow!("scenario rejected: {e}"))?;
    let mut sim = Simulation::new(state, SimConfig::default());
    sim.install_default_goals();
    Ok(sim)
}

fn run_headless(console: &mut Console, days: u64, autosave_days: u64) -> Result<()> {
    let started = Instant::now();
    for day in 1..=days {
        console.sim.run_hours(24);
        if autosave_days > 0 && day % autosave_days == 0 {
            console.autosave()?;
        }
    }
    log::info!(
        "simulated {days} days in {:.2}s",
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

fn print_summary(sim: &Simulation) {
    let m = &sim.metrics;
    println!(
        "tick {} ({}), checksum {:08x}",
        sim.state.tick,
        sim.state.time,
        sim.checksum()
    );
    println!(
        "ticks: {} ({:.3} ms avg, {:.0} sim days/s), commands: {} applied / {} rejected, events: {}",
        m.total_ticks,
        m.tick_avg_ms(),
        m.days_per_second(),
        m.commands_applied,
        m.commands_rejected,
        m.events_published
    );
    println!(
        "path cache: {} hits / {} misses, diplomacy modifiers compacted: {}",
        m.path_cache.hits, m.path_cache.misses, m.modifiers_compacted
    );
}

/// Run the same scenario twice and compare checksums along the way.
fn verify_determinism(blob: &ScenarioBlob, days: u64) -> Result<i32> {
    println!("verification: simulating {days} days twice");

    let run_once = || -> Result<Vec<u32>> {
        let mut sim = new_simulation(blob)?;
        let _handlers = sim.install_default_handlers();
        let mut checksums = Vec::with_capacity(days as usize);
        for _ in 0..days {
            sim.run_hours(24);
            checksums.push(sim.checksum());
        }
        Ok(checksums)
    };

    let first = run_once()?;
    let second = run_once()?;

    for (day, (a, b)) in first.iter().zip(&second).enumerate() {
        if a != b {
            eprintln!(
                "determinism break on day {}: {a:08x} != {b:08x}",
                day + 1
            );
            return Ok(2);
        }
    }

    println!(
        "verification passed: {} days, final checksum {:08x}",
        days,
        first.last().copied().unwrap_or(0)
    );
    Ok(0)
}

/// The runtime control surface.
struct Console {
    sim: Simulation,
    save_dir: PathBuf,
    compress: bool,
    quit: bool,
}

impl Console {
    fn execute(&mut self, line: &str) -> Result<String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&verb) = tokens.first() else {
            return Ok(String::new());
        };
        let rest = &tokens[1..];

        Ok(match verb {
            "pause" => {
                self.sim.clock.pause();
                "paused".into()
            }
            "resume" => {
                self.sim.clock.resume();
                format!("resumed at speed {}", self.sim.clock.speed_index())
            }
            "set_speed" => {
                let index: usize = parse(rest, 0, "speed index")?;
                self.sim
                    .clock
                    .set_speed(index)
                    .map_err(|e| anyhow!("{e}"))?;
                format!("speed {index}")
            }
            "advance" => {
                let days: u64 = parse(rest, 0, "days")?;
                self.sim.run_hours(days * 24);
                format!("advanced to tick {} ({})", self.sim.state.tick, self.sim.state.time)
            }
            "status" => format!(
                "tick {} ({}), {} countries, {} provinces, checksum {:08x}",
                self.sim.state.tick,
                self.sim.state.time,
                self.sim.state.countries.count(),
                self.sim.state.provinces.len(),
                self.sim.checksum()
            ),
            "declare_war" => self.submit(Command::DeclareWar {
                attacker: self.country(rest, 0)?,
                defender: self.country(rest, 1)?,
            }),
            "make_peace" => self.submit(Command::MakePeace {
                a: self.country(rest, 0)?,
                b: self.country(rest, 1)?,
            }),
            "improve_relations" => self.submit(Command::ImproveRelations {
                from: self.country(rest, 0)?,
                to: self.country(rest, 1)?,
                spend: Fixed::from_int(parse(rest, 2, "cost")?),
            }),
            "form_alliance" => self.submit(Command::FormAlliance {
                a: self.country(rest, 0)?,
                b: self.country(rest, 1)?,
            }),
            "break_alliance" => self.submit(Command::BreakAlliance {
                a: self.country(rest, 0)?,
                b: self.country(rest, 1)?,
            }),
            "form_nap" => self.submit(Command::FormNonAggressionPact {
                a: self.country(rest, 0)?,
                b: self.country(rest, 1)?,
            }),
            "break_nap" => self.submit(Command::BreakNonAggressionPact {
                a: self.country(rest, 0)?,
                b: self.country(rest, 1)?,
            }),
            "form_guarantee" => self.submit(Command::FormGuarantee {
                from: self.country(rest, 0)?,
                to: self.country(rest, 1)?,
            }),
            "break_guarantee" => self.submit(Command::BreakGuarantee {
                from: self.country(rest, 0)?,
                to: self.country(rest, 1)?,
            }),
            "grant_access" => self.submit(Command::GrantMilitaryAccess {
                from: self.country(rest, 0)?,
                to: self.country(rest, 1)?,
            }),
            "revoke_access" => self.submit(Command::RevokeMilitaryAccess {
                from: self.country(rest, 0)?,
                to: self.country(rest, 1)?,
            }),
            "create_unit" => {
                let unit_type = self
                    .sim
                    .state
                    .unit_types
                    .id_of(token(rest, 0, "unit type")?)
                    .ok_or_else(|| anyhow!("unknown unit type"))?;
                let province = ProvinceId(parse(rest, 1, "province")?);
                let country = self.sim.state.provinces.get_owner(province);
                self.submit(Command::CreateUnit {
                    province,
                    country,
                    unit_type,
                })
            }
            "move_unit" => self.submit(Command::MoveUnit {
                unit: UnitId(parse(rest, 0, "unit id")?),
                destination: ProvinceId(parse(rest, 1, "province")?),
            }),
            "build" => {
                let building = self
                    .sim
                    .state
                    .buildings
                    .id_of(token(rest, 0, "building")?)
                    .ok_or_else(|| anyhow!("unknown building"))?;
                self.submit(Command::Build {
                    province: ProvinceId(parse(rest, 1, "province")?),
                    building,
                })
            }
            "add_resource" => {
                let country = self.country(rest, 0)?;
                let resource = self
                    .sim
                    .state
                    .resource_types
                    .id_of(token(rest, 1, "resource")?)
                    .ok_or_else(|| anyhow!("unknown resource"))?;
                self.submit(Command::AddResource {
                    country,
                    resource,
                    amount: Fixed::from_int(parse(rest, 2, "amount")?),
                })
            }
            "opinion" => {
                let a = self.country(rest, 0)?;
                let b = self.country(rest, 1)?;
                format!("opinion {}", self.sim.state.opinion(a, b))
            }
            "wars" => {
                let country = self.country(rest, 0)?;
                let mut enemies = Vec::new();
                self.sim.state.diplomacy.wars_of(country, &mut enemies);
                if enemies.is_empty() {
                    "at peace".into()
                } else {
                    let tags: Vec<&str> = enemies
                        .iter()
                        .filter_map(|&id| self.sim.state.countries.tag_of(id))
                        .collect();
                    format!("at war with {}", tags.join(", "))
                }
            }
            "quicksave" => {
                self.save_to(save::quicksave_path(&self.save_dir), "quicksave")?
            }
            "quickload" => {
                let path = save::quicksave_path(&self.save_dir);
                let strict = self.sim.config.strict_verification;
                let (metadata, _) = save::load_from_file(&path, &mut self.sim.state, strict)
                    .with_context(|| format!("loading {}", path.display()))?;
                self.sim.finalize_load();
                format!("loaded '{}' at tick {}", metadata.save_name, metadata.tick)
            }
            "save" => {
                let name = token(rest, 0, "save name")?;
                self.save_to(save::named_save_path(&self.save_dir, name), name)?
            }
            "stress_diplomacy" => {
                let countries: u16 = parse(rest, 0, "countries")?;
                let per_pair: u32 = parse(rest, 1, "modifiers per pair")?;
                self.stress_diplomacy(countries, per_pair)?
            }
            "quit" | "exit" => {
                self.quit = true;
                "bye".into()
            }
            other => bail!("unknown verb '{other}'"),
        })
    }

    fn submit(&mut self, command: Command) -> String {
        match self.sim.submit(command) {
            Ok(effects) => match effects.created_unit {
                Some(unit) => format!("ok (unit {unit})"),
                None => "ok".into(),
            },
            Err(reason) => format!("rejected: {reason}"),
        }
    }

    fn country(&self, tokens: &[&str], index: usize) -> Result<CountryId> {
        let tag = token(tokens, index, "country tag")?;
        self.sim
            .state
            .countries
            .id_of(tag)
            .ok_or_else(|| anyhow!("unknown country tag '{tag}'"))
    }

    fn save_to(&mut self, path: PathBuf, name: &str) -> Result<String> {
        std::fs::create_dir_all(&self.save_dir)?;
        let metadata = SaveMetadata {
            save_name: name.into(),
            saved_at_unix: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            tick: self.sim.state.tick,
            speed_index: self.sim.clock.speed_index(),
            scenario_name: self.sim.state.scenario_name.clone(),
        };
        save::save_to_file(
            &path,
            &self.sim.state,
            &self.sim.command_log,
            &metadata,
            self.compress,
        )
        .map_err(|e| anyhow!("{e}"))?;
        Ok(format!("saved {}", path.display()))
    }

    fn autosave(&mut self) -> Result<()> {
        std::fs::create_dir_all(&self.save_dir)?;
        let tick = self.sim.state.tick;
        self.save_to(save::autosave_path(&self.save_dir, tick), "autosave")?;
        let removed = save::rotate_autosaves(&self.save_dir, self.sim.config.autosave_keep)?;
        if removed > 0 {
            log::debug!("rotated out {removed} old autosaves");
        }
        Ok(())
    }

    /// Dev tool: flood the opinion store and time one decay pass.
    fn stress_diplomacy(&mut self, countries: u16, per_pair: u32) -> Result<String> {
        let available = self.sim.state.countries.count();
        let countries = countries.min(available);
        if countries < 2 {
            bail!("need at least 2 countries");
        }
        let kind = self.sim.state.well_known.declared_war;
        let tick = self.sim.state.tick;

        let mut inserted: u64 = 0;
        for a in 1..=countries {
            for b in (a + 1)..=countries {
                for m in 0..per_pair {
                    let ok = self.sim.state.diplomacy.add_modifier(
                        CountryId(a),
                        CountryId(b),
                        TimedModifier::new(
                            kind,
                            tick,
                            720 * (1 + m % 12),
                            Fixed::from_int((m as i64 % 11) - 5),
                        ),
                    );
                    if !ok {
                        bail!("modifier capacity exhausted after {inserted}");
                    }
                    inserted += 1;
                }
            }
        }

        let started = Instant::now();
        let removed = self
            .sim
            .state
            .diplomacy
            .run_decay(tick + 720 * 13);
        let elapsed = started.elapsed();
        Ok(format!(
            "inserted {inserted} modifiers, decay pass removed {removed} in {:.2} ms",
            elapsed.as_secs_f64() * 1000.0
        ))
    }
}

fn token<'a>(tokens: &[&'a str], index: usize, what: &str) -> Result<&'a str> {
    tokens
        .get(index)
        .copied()
        .ok_or_else(|| anyhow!("missing argument: {what}"))
}

fn parse<T: std::str::FromStr>(tokens: &[&str], index: usize, what: &str) -> Result<T> {
    token(tokens, index, what)?
        .parse()
        .map_err(|_| anyhow!("invalid {what}"))
}
