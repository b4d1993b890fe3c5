use flash_env::{
    layout::{PARAM_PART_SIZE, SENTINEL},
    EnvConfig, EnvError, EnvVar, Flash, FlashEnv, FlashError, LoadState, RamFlash, SlotFault,
};

const START: u32 = 0x1000_0000;
const TOTAL_SIZE: u32 = 0x1000;
const ERASE_UNIT: u32 = 0x100;
const FIRST_SLOT: u32 = START + ERASE_UNIT;

const DEFAULTS: &[EnvVar] = &[
    EnvVar::new("baudrate", "115200"),
    EnvVar::new("hostname", "device"),
];

fn config() -> EnvConfig {
    EnvConfig::new(START, TOTAL_SIZE, ERASE_UNIT).unwrap()
}

fn fresh_env() -> FlashEnv<'static, RamFlash> {
    let _ = env_logger::builder().is_test(true).try_init();
    FlashEnv::init(RamFlash::for_config(&config()), config(), DEFAULTS).unwrap()
}

fn system_section(flash: &RamFlash) -> u32 {
    let mut bytes = [0; 4];
    flash.read(START, &mut bytes);
    u32::from_ne_bytes(bytes)
}

#[test]
fn erase_fault_moves_to_next_unit() {
    let mut env = fresh_env();
    env.set("hostname", "relocated").unwrap();
    env.flash_mut().fail_next_erases(1);

    let report = env.save().unwrap();

    assert!(report.recovered());
    assert_eq!(report.slot(), FIRST_SLOT + ERASE_UNIT);
    assert_eq!(
        report.faults(),
        [SlotFault {
            slot: FIRST_SLOT,
            error: FlashError::EraseFault
        }]
    );
    assert_eq!(env.data_section_address(), FIRST_SLOT + ERASE_UNIT);
    assert_eq!(system_section(env.flash()), FIRST_SLOT + ERASE_UNIT);

    let mut reloaded = FlashEnv::new(env.into_flash(), config(), DEFAULTS).unwrap();
    assert_eq!(reloaded.load().unwrap(), LoadState::Ready);
    assert_eq!(reloaded.get("hostname"), Some("relocated"));
    assert_eq!(reloaded.data_section_address(), FIRST_SLOT + ERASE_UNIT);
}

#[test]
fn write_fault_moves_to_next_unit() {
    let mut env = fresh_env();
    env.flash_mut().fail_next_writes(1);

    let report = env.save().unwrap();

    assert_eq!(report.fault_count(), 1);
    assert_eq!(report.faults()[0].error, FlashError::WriteFault);
    assert_eq!(report.slot(), FIRST_SLOT + ERASE_UNIT);
    assert_eq!(system_section(env.flash()), FIRST_SLOT + ERASE_UNIT);
}

#[test]
fn clean_save_stays_in_place() {
    let mut env = fresh_env();
    let erases = env.flash().erase_count(START);

    let report = env.save().unwrap();

    assert!(!report.recovered());
    assert_eq!(report.slot(), FIRST_SLOT);
    // The system section is not rewritten when the slot didn't change
    assert_eq!(env.flash().erase_count(START), erases);
}

#[test]
fn stride_is_rounded_to_erase_units() {
    let mut env = fresh_env();
    // Grow the section beyond one erase unit
    for i in 0..6 {
        env.set(&format!("long{}", i), &"x".repeat(40)).unwrap();
    }
    let detail_size = env.used_size() - (FIRST_SLOT - START) - PARAM_PART_SIZE;
    assert!(detail_size > ERASE_UNIT && detail_size + PARAM_PART_SIZE <= 2 * ERASE_UNIT);
    let end_before = env.used_size();

    env.flash_mut().fail_next_erases(1);
    let report = env.save().unwrap();

    let stride = (detail_size + ERASE_UNIT - 1) / ERASE_UNIT * ERASE_UNIT;
    assert_eq!(stride, 2 * ERASE_UNIT);
    assert_eq!(report.slot(), FIRST_SLOT + stride);
    // The end address moves along with the section
    assert_eq!(env.used_size(), end_before + stride);
    assert_eq!(system_section(env.flash()), FIRST_SLOT + stride);
}

#[test]
fn bad_unit_is_skipped_for_good() {
    let mut env = fresh_env();
    env.flash_mut().mark_bad(FIRST_SLOT, FlashError::WriteFault);

    env.set("baudrate", "9600").unwrap();
    let report = env.save().unwrap();
    assert_eq!(report.slot(), FIRST_SLOT + ERASE_UNIT);

    for i in 0..5 {
        env.set("baudrate", &format!("{}", 9600 * (i + 2))).unwrap();
        let report = env.save().unwrap();
        assert!(!report.recovered());
        assert_eq!(report.slot(), FIRST_SLOT + ERASE_UNIT);
    }

    let flash = env.flash();
    assert_eq!(flash.erase_count(FIRST_SLOT + ERASE_UNIT), 6);
    assert_eq!(system_section(flash), FIRST_SLOT + ERASE_UNIT);
}

#[test]
fn exhausted_area_clears_the_system_section() {
    let mut env = fresh_env();
    let mut slot = FIRST_SLOT;
    while slot < START + TOTAL_SIZE {
        env.flash_mut().mark_bad(slot, FlashError::EraseFault);
        slot += ERASE_UNIT;
    }

    assert_eq!(env.save(), Err(EnvError::AreaFull));
    assert_eq!(system_section(env.flash()), SENTINEL);

    // The next start tries the defaults again, which can't be stored either
    let mut reloaded = FlashEnv::new(env.into_flash(), config(), DEFAULTS).unwrap();
    assert_eq!(reloaded.load(), Err(EnvError::AreaFull));
}

#[test]
fn fault_log_is_bounded() {
    let mut env = fresh_env();
    env.flash_mut().fail_next_erases(10);

    let report = env.save().unwrap();

    assert_eq!(report.fault_count(), 10);
    assert_eq!(report.faults().len(), flash_env::FAULT_LOG_SIZE);
    assert_eq!(report.slot(), FIRST_SLOT + 10 * ERASE_UNIT);
}

#[test]
fn failed_system_section_write_is_reported() {
    let mut env = fresh_env();
    env.set("hostname", "lost-pointer").unwrap();
    env.flash_mut().mark_bad(FIRST_SLOT, FlashError::EraseFault);
    env.flash_mut().mark_bad(START, FlashError::WriteFault);

    assert_eq!(
        env.save(),
        Err(EnvError::SystemSection(FlashError::WriteFault))
    );

    // The data section itself was stored
    let new_slot = FIRST_SLOT + ERASE_UNIT;
    assert_eq!(env.data_section_address(), new_slot);
    let mut end_address = [0; 4];
    env.flash().read(new_slot, &mut end_address);
    assert_eq!(
        u32::from_ne_bytes(end_address),
        START + env.used_size()
    );
}

#[test]
fn failed_system_section_erase_is_retried() {
    let mut env = fresh_env();
    env.set("hostname", "moved").unwrap();
    env.flash_mut().mark_bad(FIRST_SLOT, FlashError::EraseFault);
    env.flash_mut().mark_bad(START, FlashError::EraseFault);

    assert_eq!(
        env.save(),
        Err(EnvError::SystemSection(FlashError::EraseFault))
    );

    // The old pointer is still there, the data went to the next unit
    let new_slot = FIRST_SLOT + ERASE_UNIT;
    assert_eq!(system_section(env.flash()), FIRST_SLOT);
    assert_eq!(env.data_section_address(), new_slot);
    let mut end_address = [0; 4];
    env.flash().read(new_slot, &mut end_address);
    assert_eq!(u32::from_ne_bytes(end_address), START + env.used_size());

    env.flash_mut().repair(START);
    let report = env.save().unwrap();

    assert!(!report.recovered());
    assert_eq!(report.slot(), new_slot);
    assert_eq!(system_section(env.flash()), new_slot);

    let mut reloaded = FlashEnv::new(env.into_flash(), config(), DEFAULTS).unwrap();
    assert_eq!(reloaded.load().unwrap(), LoadState::Ready);
    assert_eq!(reloaded.get("hostname"), Some("moved"));
}

#[test]
fn exhausted_area_with_stuck_system_section_keeps_last_save() {
    let mut env = fresh_env();
    env.set("hostname", "unsaved").unwrap();
    let mut slot = FIRST_SLOT;
    while slot < START + TOTAL_SIZE {
        env.flash_mut().mark_bad(slot, FlashError::EraseFault);
        slot += ERASE_UNIT;
    }
    env.flash_mut().mark_bad(START, FlashError::EraseFault);

    assert_eq!(env.save(), Err(EnvError::AreaFull));
    // The sentinel could not be stored, the last saved section is still referenced
    assert_eq!(system_section(env.flash()), FIRST_SLOT);

    let mut reloaded = FlashEnv::new(env.into_flash(), config(), DEFAULTS).unwrap();
    assert_eq!(reloaded.load().unwrap(), LoadState::Ready);
    assert_eq!(reloaded.get("hostname"), Some("device"));
}

#[test]
fn stride_counts_the_parameter_part() {
    let mut env = fresh_env();
    // The defaults take 32 bytes, this fills the detail part up to exactly one erase unit
    env.set("pad", &"x".repeat(219)).unwrap();
    let detail_size = env.used_size() - (FIRST_SLOT - START) - PARAM_PART_SIZE;
    assert_eq!(detail_size, ERASE_UNIT);

    env.flash_mut().fail_next_erases(1);
    let report = env.save().unwrap();

    // With the parameter part the section spans two units, so both are skipped
    assert_eq!(report.slot(), FIRST_SLOT + 2 * ERASE_UNIT);
    assert_eq!(system_section(env.flash()), FIRST_SLOT + 2 * ERASE_UNIT);
}
