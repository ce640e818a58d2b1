use actix_web::web;

use crate::errors::AppError;

pub mod power_consumers;
pub mod prices;

pub fn config(cfg: &mut web::ServiceConfig) {
    // Malformed query values get the same JSON error body as other bad requests
    cfg.app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::user_error(err.to_string()).into()),
    );

    cfg.service(
        web::scope("/power-consumer")
            .service(power_consumers::list_power_consumers)
            .service(power_consumers::schedule_consumption_plan)
            .service(power_consumers::delete_consumption_plan)
            .service(power_consumers::get_consumption_plan_history),
    );

    cfg.service(web::scope("/pricelist").service(prices::get_price_list));
}
