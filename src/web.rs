use std::{convert::Infallible, net::SocketAddr};

use async_graphql_warp::GraphQLResponse;
use warp::Filter;

use crate::api::Schema;

pub(crate) async fn serve(schema: Schema, addr: SocketAddr) {
    let graphql = async_graphql_warp::graphql(schema).and_then(
        |(schema, request): (Schema, async_graphql::Request)| async move {
            Ok::<_, Infallible>(GraphQLResponse::from(schema.execute(request).await))
        },
    );
    let routes = warp::path("graphql").and(graphql);
    warp::serve(routes).run(addr).await;
}
