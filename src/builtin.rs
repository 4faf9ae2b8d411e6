//! Collectors shipped with the agent
//!
//! Host metrics are read through `sysinfo`. The `scollector` collector
//! publishes the process-wide self-monitoring counters.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::anyhow;
use sysinfo::{Components, System};

use crate::collector::{Collected, Collector, ContinuousSpec, IntervalSpec, PoolTask};
use crate::config::Config;
use crate::context::TelemetryContext;
use crate::datapoint::{MetricMeta, MultiDataPoint, RateType};
use crate::error::CollectorError;
use crate::metadata::unit;
use crate::registry::Registry;
use crate::tags::{TagSet, clean};

const LOAD_INTERVAL: Duration = Duration::from_secs(5);
const UPTIME_INTERVAL: Duration = Duration::from_secs(60);
const SYSTEM_WORKERS: usize = 2;

/// Registers every built-in collector plus the push listener when configured.
/// The listener checks pushed points with `ctx`'s validator.
pub fn register_all(
    registry: &mut Registry,
    config: &Config,
    ctx: &TelemetryContext,
) -> Result<(), CollectorError> {
    registry.register(scollector_counters())?;
    registry.register(cpu())?;
    registry.register(memory())?;
    registry.register(temperature())?;
    registry.register(system())?;

    #[cfg(feature = "listener")]
    if let Some(listener) = &config.listener {
        registry.register(crate::listener::collector(listener.addr, ctx.validator()))?;
    }
    #[cfg(not(feature = "listener"))]
    let _ = (config, ctx);

    Ok(())
}

fn lock(sys: &Mutex<System>) -> MutexGuard<'_, System> {
    sys.lock().unwrap_or_else(|e| e.into_inner())
}

/// Publishes `scollector.<key>` for every framework counter.
pub fn scollector_counters() -> Collector {
    Collector::interval(
        "scollector",
        IntervalSpec::new(|ctx: Arc<TelemetryContext>| async move {
            let mut md = MultiDataPoint::new();
            for (key, value) in ctx.counters().snapshot() {
                ctx.add(
                    &mut md,
                    &format!("scollector.{}", clean(&key)),
                    value,
                    None,
                    RateType::Gauge,
                    unit::COUNT,
                    "",
                );
            }
            Collected::ok(md)
        }),
    )
}

pub fn cpu() -> Collector {
    let sys = Arc::new(Mutex::new(System::new()));
    let init_sys = sys.clone();

    Collector::interval(
        "cpu",
        IntervalSpec::new(move |ctx: Arc<TelemetryContext>| {
            let sys = sys.clone();
            async move {
                let mut sys = lock(&sys);
                sys.refresh_cpu_usage();

                let total = MetricMeta::new("os.cpu", RateType::Gauge, unit::PCT)
                    .with_desc("Percentage of CPU time in use across all cores.");
                let per_cpu = MetricMeta::new("os.cpu.core", RateType::Gauge, unit::PCT);

                let mut md = MultiDataPoint::new();
                ctx.add_meta(&mut md, &total, sys.global_cpu_usage(), None);
                for cpu in sys.cpus() {
                    let tags = TagSet::from([("cpu", clean(cpu.name()))]);
                    ctx.add_meta(&mut md, &per_cpu, cpu.cpu_usage(), Some(&tags));
                }
                Collected::ok(md)
            }
        })
        // usage needs a baseline sample
        .with_init(move || lock(&init_sys).refresh_cpu_usage())
        .with_enable(|| sysinfo::IS_SUPPORTED_SYSTEM),
    )
}

pub fn memory() -> Collector {
    let sys = Arc::new(Mutex::new(System::new()));

    Collector::interval(
        "memory",
        IntervalSpec::new(move |ctx: Arc<TelemetryContext>| {
            let sys = sys.clone();
            async move {
                let mut sys = lock(&sys);
                sys.refresh_memory();

                if sys.total_memory() == 0 {
                    return Collected::failed(anyhow!("memory information unavailable"));
                }

                let mut md = MultiDataPoint::new();
                let mem = [
                    ("os.mem.total", sys.total_memory(), "Total physical memory."),
                    ("os.mem.used", sys.used_memory(), "Physical memory in use."),
                    ("os.mem.free", sys.free_memory(), "Unused physical memory."),
                    ("os.swap.total", sys.total_swap(), "Total swap space."),
                    ("os.swap.used", sys.used_swap(), "Swap space in use."),
                ];
                for (metric, value, desc) in mem {
                    ctx.add(&mut md, metric, value, None, RateType::Gauge, unit::BYTES, desc);
                }

                let used_pct = sys.used_memory() as f64 / sys.total_memory() as f64 * 100.0;
                ctx.add(
                    &mut md,
                    "os.mem.percent_used",
                    used_pct,
                    None,
                    RateType::Gauge,
                    unit::PCT,
                    "",
                );
                Collected::ok(md)
            }
        })
        .with_enable(|| sysinfo::IS_SUPPORTED_SYSTEM),
    )
}

pub fn temperature() -> Collector {
    let components = Arc::new(Mutex::new(Components::new()));

    Collector::interval(
        "temperature",
        IntervalSpec::new(move |ctx: Arc<TelemetryContext>| {
            let components = components.clone();
            async move {
                let mut components = components.lock().unwrap_or_else(|e| e.into_inner());
                components.refresh(true);

                let mut md = MultiDataPoint::new();
                for component in components.iter() {
                    let Some(temp) = component.temperature() else {
                        continue;
                    };
                    let tags = TagSet::from([("component", clean(component.label()))]);
                    ctx.add(
                        &mut md,
                        "os.temperature",
                        temp,
                        Some(&tags),
                        RateType::Gauge,
                        "C",
                        "Sensor temperature in degrees Celsius.",
                    );
                }
                Collected::ok(md)
            }
        })
        .with_enable(|| !Components::new_with_refreshed_list().is_empty()),
    )
}

/// Load and uptime on their own schedules, sharing two workers.
pub fn system() -> Collector {
    let tasks = vec![
        PoolTask::new("load", LOAD_INTERVAL, |ctx: Arc<TelemetryContext>| async move {
            let load = System::load_average();
            let mut md = MultiDataPoint::new();
            for (metric, value) in [
                ("os.load.1", load.one),
                ("os.load.5", load.five),
                ("os.load.15", load.fifteen),
            ] {
                ctx.add(&mut md, metric, value, None, RateType::Gauge, unit::LOAD, "");
            }
            Collected::ok(md)
        }),
        PoolTask::new("uptime", UPTIME_INTERVAL, |ctx: Arc<TelemetryContext>| async move {
            let mut md = MultiDataPoint::new();
            ctx.add(
                &mut md,
                "os.system.uptime",
                System::uptime(),
                None,
                RateType::Gauge,
                unit::SECOND,
                "Seconds since boot.",
            );
            Collected::ok(md)
        }),
    ];

    Collector::continuous("system", ContinuousSpec::pool(SYSTEM_WORKERS, tasks))
}
