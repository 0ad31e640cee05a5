use crate::error::{ReportError, Result};
use crate::models::{
    Attendance, CityUpdate, KendraUpdate, NewCity, NewKendra, NewReport, ReportUpdate, Role,
    User, UserUpdate,
};

pub fn validate_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

pub fn validate_pin_code(pin_code: &str) -> bool {
    pin_code.len() == 6 && pin_code.bytes().all(|b| b.is_ascii_digit())
}

fn require_name(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ReportError::validation(format!("{what} is required")));
    }
    Ok(())
}

fn require_count(value: i32, what: &str) -> Result<()> {
    if value < 0 {
        return Err(ReportError::validation(format!(
            "{what} attendance cannot be negative"
        )));
    }
    Ok(())
}

pub fn validate_attendance(attendance: &Attendance) -> Result<()> {
    require_count(attendance.yuva, "Yuva Kendra")?;
    require_count(attendance.bhavferni, "Bhavferni")?;
    require_count(attendance.pravachan, "Pravachan")?;
    Ok(())
}

pub fn validate_new_report(report: &NewReport) -> Result<()> {
    validate_attendance(&report.attendance)
}

pub fn validate_report_update(update: &ReportUpdate) -> Result<()> {
    if let Some(yuva) = update.yuva {
        require_count(yuva, "Yuva Kendra")?;
    }
    if let Some(bhavferni) = update.bhavferni {
        require_count(bhavferni, "Bhavferni")?;
    }
    if let Some(pravachan) = update.pravachan {
        require_count(pravachan, "Pravachan")?;
    }
    Ok(())
}

pub fn validate_new_city(city: &NewCity) -> Result<()> {
    require_name(&city.name, "City name")?;
    if !validate_pin_code(&city.pin_code) {
        return Err(ReportError::validation("valid 6-digit PIN code is required"));
    }
    Ok(())
}

pub fn validate_city_update(update: &CityUpdate) -> Result<()> {
    if let Some(name) = &update.name {
        require_name(name, "City name")?;
    }
    if let Some(pin_code) = &update.pin_code {
        if !validate_pin_code(pin_code) {
            return Err(ReportError::validation("valid 6-digit PIN code is required"));
        }
    }
    Ok(())
}

pub fn validate_new_kendra(kendra: &NewKendra) -> Result<()> {
    require_name(&kendra.name, "Kendra name")
}

pub fn validate_kendra_update(update: &KendraUpdate) -> Result<()> {
    if let Some(name) = &update.name {
        require_name(name, "Kendra name")?;
    }
    Ok(())
}

/// Checks the update against the user as it would look afterwards, so a
/// member can't be left without a kendra. Admins are never bound to one;
/// the gateway drops any existing binding when a user becomes admin.
pub fn validate_user_update(current: &User, update: &UserUpdate) -> Result<()> {
    if let Some(name) = &update.name {
        require_name(name, "Name")?;
    }
    if let Some(email) = &update.email {
        if !validate_email(email) {
            return Err(ReportError::validation("valid email is required"));
        }
    }
    let role = update.role.unwrap_or(current.role);
    if role == Role::Admin && update.kendra_id.is_some() {
        return Err(ReportError::validation(
            "admins cannot be assigned to a kendra",
        ));
    }
    let kendra_id = update.kendra_id.or(current.kendra_id);
    if role == Role::Member && kendra_id.is_none() {
        return Err(ReportError::validation(
            "kendra assignment is required for members",
        ));
    }
    Ok(())
}
