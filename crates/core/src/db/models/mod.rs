//! SeaORM entity models
//!
//! Database entities for Carta

mod user;
mod restaurant;
mod category;
mod product;
mod menu_view;

pub use user::{
    Entity as UserEntity,
    Model as User,
    ActiveModel as UserActiveModel,
    Column as UserColumn,
    Plan,
    SubscriptionStatus,
};

pub use restaurant::{
    Entity as RestaurantEntity,
    Model as Restaurant,
    ActiveModel as RestaurantActiveModel,
    Column as RestaurantColumn,
};

pub use category::{
    Entity as CategoryEntity,
    Model as Category,
    ActiveModel as CategoryActiveModel,
    Column as CategoryColumn,
};

pub use product::{
    Entity as ProductEntity,
    Model as Product,
    ActiveModel as ProductActiveModel,
    Column as ProductColumn,
};

pub use menu_view::{
    Entity as MenuViewEntity,
    Model as MenuView,
    ActiveModel as MenuViewActiveModel,
    Column as MenuViewColumn,
};
