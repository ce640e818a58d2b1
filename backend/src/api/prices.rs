use crate::{
    errors::AppError,
    services::{power_consumers_service::PowerConsumersService, price_sources::start_of_day},
};
use actix_web::{HttpResponse, Responder, ResponseError, get, web};
use chrono::NaiveDate;

/// Get the price list of a day given as `dd-mm-yyyy`
#[get("/{date}")]
pub async fn get_price_list(service: web::Data<PowerConsumersService>, path: web::Path<String>) -> impl Responder {
    let date = match NaiveDate::parse_from_str(&path, "%d-%m-%Y") {
        Ok(date) => date,
        Err(_) => {
            return AppError::user_error(format!("Incorrect date: {}, expected dd-mm-yyyy", path))
                .error_response();
        }
    };

    let day = start_of_day(date, service.time_zone());
    match service.get_day_price_list(day).await {
        Ok(price_list) => HttpResponse::Ok().json(price_list),
        Err(e) => e.error_response(),
    }
}
