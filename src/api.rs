use rocket::Route;

mod auth;
pub mod errors;
mod notes;

pub fn routes() -> Vec<Route> {
    let mut routes = rocket::routes![hello];
    routes.extend(auth::routes());
    routes.extend(notes::routes());
    routes
}

#[rocket::get("/hello")]
async fn hello() -> &'static str {
    "hello"
}
