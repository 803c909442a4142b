pub mod handler;
pub mod media;
pub mod request;
pub mod response;
pub mod route;
pub mod router;
pub mod server;
pub mod url;

pub use handler::{BoxFuture, Endpoint, Handler, Middleware, Next, reject};
pub use media::MediaType;
pub use request::Request;
pub use response::Response;
pub use route::{Hook, Params, Route, RouteError};
pub use router::Router;
pub use server::{Server, ServerEvent};
pub use url::{CanonicalUrl, Normalizer, Query, UrlError, UrlLimits, normalize, parse_form};
