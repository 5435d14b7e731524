use tray_icon::{
    menu::{CheckMenuItem, Menu, MenuId, MenuItem, PredefinedMenuItem, Submenu},
    TrayIcon, TrayIconBuilder,
};
use tracing::warn;

use battery_saver_core::display;

use crate::poller::Command;
use crate::state::{threshold_options, ThresholdChoice, TrayState};

/// Handles to the items whose text or check state follows the config.
pub struct MenuItems {
    pub status_item: MenuItem,
    pub threshold_menu: Submenu,
    pub threshold_items: Vec<(CheckMenuItem, ThresholdChoice)>,
    pub mode_item: MenuItem,
    pub smart_item: MenuItem,
    pub enabled_item: CheckMenuItem,
    pub percentage_item: CheckMenuItem,
    pub lpm_on_item: MenuItem,
    pub lpm_off_item: MenuItem,
    pub battery_item: MenuItem,
    pub power_mode_item: MenuItem,
    pub analytics_item: MenuItem,
    pub setup_item: MenuItem,
    pub about_item: MenuItem,
    pub quit_item: MenuItem,
}

pub fn build_menu(state: &TrayState) -> (Menu, MenuItems) {
    let menu = Menu::new();
    let config = &state.config;

    let status_item = MenuItem::new(state.status_text(), false, None);
    let threshold_menu = Submenu::new(display::threshold_title(config), true);
    let mode_item = MenuItem::new(display::mode_label(config.threshold_mode), true, None);
    let smart_item =
        MenuItem::new(display::smart_auto_label(config.smart_auto_enabled), true, None);
    let enabled_item = CheckMenuItem::new("Enabled", true, config.enabled, None);
    let percentage_item = CheckMenuItem::new("Show Percentage", true, config.show_percentage, None);
    let lpm_on_item = MenuItem::new("Enable Low Power Mode Now", true, None);
    let lpm_off_item = MenuItem::new("Disable Low Power Mode Now", true, None);
    let battery_item = MenuItem::new("Current Battery", true, None);
    let power_mode_item = MenuItem::new("Current Power Mode", true, None);
    let analytics_item = MenuItem::new("Battery Analytics", true, None);
    let setup_item = MenuItem::new("Set Up Passwordless Access...", true, None);
    let about_item = MenuItem::new("About", true, None);
    let quit_item = MenuItem::new("Quit", true, None);

    let _ = menu.append_items(&[
        &status_item,
        &PredefinedMenuItem::separator(),
        &threshold_menu,
        &mode_item,
        &smart_item,
        &enabled_item,
        &percentage_item,
        &PredefinedMenuItem::separator(),
        &lpm_on_item,
        &lpm_off_item,
        &PredefinedMenuItem::separator(),
        &battery_item,
        &power_mode_item,
        &analytics_item,
        &PredefinedMenuItem::separator(),
        &setup_item,
        &about_item,
        &quit_item,
    ]);

    let mut items = MenuItems {
        status_item,
        threshold_menu,
        threshold_items: Vec::new(),
        mode_item,
        smart_item,
        enabled_item,
        percentage_item,
        lpm_on_item,
        lpm_off_item,
        battery_item,
        power_mode_item,
        analytics_item,
        setup_item,
        about_item,
        quit_item,
    };
    rebuild_thresholds(&mut items, state);

    (menu, items)
}

/// Replace the submenu entries with those for the current mode.
pub fn rebuild_thresholds(items: &mut MenuItems, state: &TrayState) {
    for (item, _) in items.threshold_items.drain(..) {
        if let Err(e) = items.threshold_menu.remove(&item) {
            warn!(error = %e, "failed to remove threshold item");
        }
    }
    for option in threshold_options(&state.config) {
        let item = CheckMenuItem::new(&option.label, true, option.checked, None);
        if let Err(e) = items.threshold_menu.append(&item) {
            warn!(error = %e, "failed to add threshold item");
        }
        items.threshold_items.push((item, option.choice));
    }
}

/// Bring labels and checks in line with the state.
pub fn sync_menu(items: &MenuItems, state: &TrayState) {
    let config = &state.config;
    items.status_item.set_text(state.status_text());
    items.threshold_menu.set_text(display::threshold_title(config));
    items.mode_item.set_text(display::mode_label(config.threshold_mode));
    items.smart_item.set_text(display::smart_auto_label(config.smart_auto_enabled));
    items.enabled_item.set_checked(config.enabled);
    items.percentage_item.set_checked(config.show_percentage);

    for (item, option) in items.threshold_items.iter().zip(threshold_options(config)) {
        item.set_checked(option.checked);
    }
}

/// Map a clicked menu id to a poller command. `None` for Quit and
/// non-interactive items.
pub fn command_for(items: &MenuItems, id: &MenuId) -> Option<Command> {
    if let Some((_, choice)) = items.threshold_items.iter().find(|(item, _)| item.id() == id) {
        return Some(Command::SetThreshold(*choice));
    }

    let simple = [
        (items.mode_item.id(), Command::ToggleMode),
        (items.smart_item.id(), Command::ToggleSmartAuto),
        (items.enabled_item.id(), Command::ToggleEnabled),
        (items.percentage_item.id(), Command::ToggleShowPercentage),
        (items.lpm_on_item.id(), Command::LowPowerNow(true)),
        (items.lpm_off_item.id(), Command::LowPowerNow(false)),
        (items.battery_item.id(), Command::ShowBattery),
        (items.power_mode_item.id(), Command::ShowPowerMode),
        (items.analytics_item.id(), Command::ShowAnalytics),
        (items.setup_item.id(), Command::RunSetup),
        (items.about_item.id(), Command::ShowAbout),
    ];
    simple
        .into_iter()
        .find(|(item_id, _)| *item_id == id)
        .map(|(_, cmd)| cmd)
}

pub fn build_tray(menu: Menu, state: &TrayState) -> Option<TrayIcon> {
    // Title only: the glyph is the icon.
    match TrayIconBuilder::new()
        .with_menu(Box::new(menu))
        .with_tooltip(state.tooltip())
        .with_title(state.title())
        .with_menu_on_left_click(true)
        .build()
    {
        Ok(tray) => Some(tray),
        Err(e) => {
            warn!(error = %e, "failed to build tray icon");
            None
        }
    }
}

pub fn update_tray(tray: &TrayIcon, state: &TrayState) {
    tray.set_title(Some(state.title()));
    if let Err(e) = tray.set_tooltip(Some(state.tooltip())) {
        warn!(error = %e, "failed to set tooltip");
    }
}
