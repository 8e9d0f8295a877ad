use items_core::topology::EntryPoint;
use lambda_runtime::Error;

#[tokio::main]
async fn main() -> Result<(), Error> {
    items_functions::runtime::run(EntryPoint::CreateOne).await
}
