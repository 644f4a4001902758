use crate::handler::HandlerError;
use crate::http::headers::Headers;
use crate::http::response::ResponseWriter;
use crate::http::status::StatusCode;

pub const BAD_REQUEST_HTML: &str = "<html>
  <head>
    <title>400 Bad Request</title>
  </head>
  <body>
    <h1>Bad Request</h1>
    <p>The server could not understand this request.</p>
  </body>
</html>";

pub const INTERNAL_SERVER_ERROR_HTML: &str = "<html>
  <head>
    <title>500 Internal Server Error</title>
  </head>
  <body>
    <h1>Internal Server Error</h1>
    <p>Something went wrong on our side while handling this request.</p>
  </body>
</html>";

pub const SUCCESS_HTML: &str = "<html>
  <head>
    <title>200 OK</title>
  </head>
  <body>
    <h1>Success!</h1>
    <p>Your request was handled successfully.</p>
  </body>
</html>";

pub async fn html(
    writer: &mut ResponseWriter<'_>,
    status: StatusCode,
    body: &str,
) -> Result<(), HandlerError> {
    let mut headers = Headers::new();
    headers.set("content-type", "text/html");
    headers.set("connection", "close");
    headers.set("content-length", &body.len().to_string());

    writer.write_status_line(status).await?;
    writer.write_headers(&headers).await?;
    writer.write_body(body.as_bytes()).await?;
    Ok(())
}
