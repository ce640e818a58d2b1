use crate::{errors::AppError, services::power_consumers_service::PowerConsumersService};
use actix_web::{HttpResponse, Responder, ResponseError, delete, get, post, web};
use chrono::{DateTime, TimeDelta};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleQuery {
    /// Milliseconds
    pub consumption_duration: Option<i64>,
    /// Epoch milliseconds
    pub finish_at: Option<i64>,
}

fn required_param(value: Option<i64>, name: &str) -> Result<i64, AppError> {
    value.ok_or_else(|| AppError::user_error(format!("Required param is missing: {}", name)))
}

/// List all power consumers with their current plans
#[get("")]
pub async fn list_power_consumers(service: web::Data<PowerConsumersService>) -> impl Responder {
    HttpResponse::Ok().json(service.power_consumer_models().await)
}

/// Schedule a consumption plan finishing at `finishAt`
#[post("/{power_consumer_id}/consumption-plan")]
pub async fn schedule_consumption_plan(
    service: web::Data<PowerConsumersService>,
    path: web::Path<String>,
    query: web::Query<ScheduleQuery>,
) -> impl Responder {
    let consumption_duration = match required_param(query.consumption_duration, "consumptionDuration")
        .and_then(|ms| TimeDelta::try_milliseconds(ms).ok_or_else(|| AppError::user_error("Invalid consumptionDuration")))
    {
        Ok(duration) => duration,
        Err(e) => return e.error_response(),
    };
    let finish_at = match required_param(query.finish_at, "finishAt")
        .and_then(|ms| DateTime::from_timestamp_millis(ms).ok_or_else(|| AppError::user_error("Invalid finishAt")))
    {
        Ok(finish_at) => finish_at,
        Err(e) => return e.error_response(),
    };

    match service
        .schedule_consumption_plan(&path, consumption_duration, finish_at)
        .await
    {
        Ok(model) => HttpResponse::Ok().json(model),
        Err(e) => e.error_response(),
    }
}

/// Cancel the current consumption plan
#[delete("/{power_consumer_id}/consumption-plan")]
pub async fn delete_consumption_plan(
    service: web::Data<PowerConsumersService>,
    path: web::Path<String>,
) -> impl Responder {
    match service.delete_consumption_plan(&path).await {
        Ok(model) => HttpResponse::Ok().json(model),
        Err(e) => e.error_response(),
    }
}

/// Finished plans, newest first
#[get("/{power_consumer_id}/consumption-plan/history")]
pub async fn get_consumption_plan_history(
    service: web::Data<PowerConsumersService>,
    path: web::Path<String>,
) -> impl Responder {
    match service.consumption_plan_history(&path).await {
        Ok(history) => HttpResponse::Ok().json(history),
        Err(e) => e.error_response(),
    }
}
