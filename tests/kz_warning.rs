use log::{Level, LevelFilter, Log, Metadata, Record};
use slm_pattern::{Field, Objective, Slm};
use std::sync::Mutex;

struct Capture(Mutex<Vec<String>>);

impl Log for Capture {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Warn
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            if let Ok(mut records) = self.0.lock() {
                records.push(record.args().to_string());
            }
        }
    }

    fn flush(&self) {}
}

static LOGGER: Capture = Capture(Mutex::new(Vec::new()));

fn take() -> Vec<String> {
    std::mem::take(&mut *LOGGER.0.lock().unwrap())
}

fn field(magnification: f64) -> Field {
    let slm = Slm::new([32, 32], (8.2, 8.2), 500.0).unwrap();
    let objective = Objective::new(10.0, 0.3, 200.0).unwrap();
    Field::new(slm, objective, 0.488, magnification).unwrap()
}

// one test per binary, the logger is process wide
#[test]
fn evanescent_frequencies_are_reported_once() {
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(LevelFilter::Warn);

    let high = field(60.0);
    let k0 = high.system().k0();
    let expected = high.polar_k().iter().filter(|&&k| k > k0).count();
    assert!(expected > 0);

    take();
    let kz = high.kz();
    let warnings = take();
    assert_eq!(warnings.len(), 1, "{:?}", warnings);
    assert!(warnings[0].starts_with(&format!("{} ", expected)), "{}", warnings[0]);
    assert_eq!(kz[[0, 0]], 0.0);

    let low = field(1.0);
    let (_, clamped) = low.system().kz_clamped();
    assert_eq!(clamped, 0);
    assert!(take().is_empty());
}
